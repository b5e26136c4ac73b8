use std::sync::Arc;
use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::services::attempt_service::AttemptService;

/// Periodically auto-submits attempts whose deadline has passed.
///
/// Runs on the actix runtime so it stops together with the server.
pub fn spawn(attempts: Arc<AttemptService>, every: Duration) -> JoinHandle<()> {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("attempt sweeper running every {:?}", every);

        loop {
            ticker.tick().await;
            if let Err(e) = attempts.sweep_expired().await {
                log::error!("attempt sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Store};
    use crate::models::domain::{exam::test_settings, AttemptStatus, ClientInfo, Exam, ExamAttempt};
    use crate::repositories::InMemoryNotificationRepository;
    use crate::services::notification_service::NotificationService;
    use chrono::Utc;

    #[actix_rt::test]
    async fn sweeper_closes_expired_attempts_in_the_background() {
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(NotificationService::new(
            Arc::new(InMemoryNotificationRepository::new()),
            30,
        ));
        let attempts = Arc::new(AttemptService::new(store.clone(), notifications));

        let exam = Exam::new_draft(test_settings("Timed"), "author");
        let mut attempt = ExamAttempt::begin("student", &exam, ClientInfo::default(), Utc::now());
        attempt.end_time = Utc::now() - chrono::Duration::seconds(5);
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_exam(&exam).await.unwrap();
            tx.insert_attempt(&attempt).await.unwrap();
            tx.commit().await.unwrap();
        }

        let handle = spawn(attempts, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let mut tx = store.begin().await.unwrap();
        let closed = tx.find_attempt(&attempt.id).await.unwrap().unwrap();
        assert_eq!(closed.status, AttemptStatus::Completed);
        assert!(closed.auto_submitted);
    }
}
