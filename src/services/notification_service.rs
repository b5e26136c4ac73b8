use std::sync::Arc;

use chrono::Duration;

use crate::{
    errors::AppResult,
    models::domain::{Notification, NotificationPayload},
    repositories::NotificationRepository,
};

pub const LATEST_NOTIFICATIONS: i64 = 20;

/// Outcome of a batch send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    ttl: Duration,
}

impl NotificationService {
    pub fn new(repository: Arc<dyn NotificationRepository>, ttl_days: i64) -> Self {
        Self {
            repository,
            ttl: Duration::days(ttl_days),
        }
    }

    pub async fn notify(&self, user_id: &str, payload: NotificationPayload) -> AppResult<Notification> {
        let notification = Notification::new(user_id, payload, self.ttl);
        self.repository.insert(&notification).await?;
        Ok(notification)
    }

    /// Sends one notification per user. Individual failures are logged and
    /// counted; they never stop the rest of the batch.
    pub async fn notify_many(&self, user_ids: &[String], payload: &NotificationPayload) -> DispatchReport {
        let mut report = DispatchReport::default();
        for user_id in user_ids {
            match self.notify(user_id, payload.clone()).await {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    log::warn!("failed to notify user '{}': {}", user_id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Fire-and-forget variant used after a committed operation.
    pub async fn notify_best_effort(&self, user_id: &str, payload: NotificationPayload) {
        if let Err(e) = self.notify(user_id, payload).await {
            log::warn!("failed to notify user '{}': {}", user_id, e);
        }
    }

    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        self.repository
            .list_for_user(user_id, LATEST_NOTIFICATIONS)
            .await
    }

    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.repository.count_unread(user_id).await
    }

    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        self.repository.mark_read(user_id, notification_id).await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.repository.mark_all_read(user_id).await
    }

    pub async fn delete(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        self.repository.delete(user_id, notification_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::models::domain::NotificationKind;
    use crate::repositories::InMemoryNotificationRepository;
    use async_trait::async_trait;

    fn payload(title: &str) -> NotificationPayload {
        NotificationPayload {
            kind: NotificationKind::System,
            title: title.to_string(),
            message: "message".to_string(),
            link: "/".to_string(),
        }
    }

    fn service() -> NotificationService {
        NotificationService::new(Arc::new(InMemoryNotificationRepository::new()), 30)
    }

    #[tokio::test]
    async fn list_returns_latest_twenty_newest_first() {
        let service = service();
        for i in 0..25 {
            service.notify("u1", payload(&format!("n{}", i))).await.unwrap();
        }
        service.notify("u2", payload("other")).await.unwrap();

        let listed = service.list_for_user("u1").await.unwrap();
        assert_eq!(listed.len(), 20);
        assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert!(listed.iter().all(|n| n.user_id == "u1"));
    }

    #[tokio::test]
    async fn read_state_is_per_user() {
        let service = service();
        let first = service.notify("u1", payload("a")).await.unwrap();
        service.notify("u1", payload("b")).await.unwrap();
        assert_eq!(service.unread_count("u1").await.unwrap(), 2);

        service.mark_read("u1", &first.id).await.unwrap();
        assert_eq!(service.unread_count("u1").await.unwrap(), 1);

        assert!(matches!(
            service.mark_read("u2", &first.id).await,
            Err(AppError::NotFound(_))
        ));

        assert_eq!(service.mark_all_read("u1").await.unwrap(), 1);
        assert_eq!(service.unread_count("u1").await.unwrap(), 0);

        service.delete("u1", &first.id).await.unwrap();
        assert_eq!(service.list_for_user("u1").await.unwrap().len(), 1);
    }

    struct FlakyRepository {
        inner: InMemoryNotificationRepository,
    }

    #[async_trait]
    impl NotificationRepository for FlakyRepository {
        async fn insert(&self, notification: &Notification) -> AppResult<()> {
            if notification.user_id == "broken" {
                return Err(AppError::DatabaseError("write failed".into()));
            }
            self.inner.insert(notification).await
        }
        async fn list_for_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<Notification>> {
            self.inner.list_for_user(user_id, limit).await
        }
        async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
            self.inner.count_unread(user_id).await
        }
        async fn mark_read(&self, user_id: &str, id: &str) -> AppResult<()> {
            self.inner.mark_read(user_id, id).await
        }
        async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
            self.inner.mark_all_read(user_id).await
        }
        async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
            self.inner.delete(user_id, id).await
        }
        async fn ensure_indexes(&self) -> AppResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn batch_continues_past_failures() {
        let service = NotificationService::new(
            Arc::new(FlakyRepository {
                inner: InMemoryNotificationRepository::new(),
            }),
            30,
        );
        let users = vec!["a".to_string(), "broken".to_string(), "c".to_string()];

        let report = service.notify_many(&users, &payload("maintenance")).await;

        assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });
        assert_eq!(service.unread_count("c").await.unwrap(), 1);
    }
}
