use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{FindOptions, IndexOptions},
    Collection, IndexModel,
};
use tokio::sync::RwLock;

use crate::{
    db::{mongo::NOTIFICATIONS, Database},
    errors::{AppError, AppResult},
    models::domain::Notification,
};

/// Notifications live outside the unit of work; a failed write never rolls
/// back the operation that triggered it.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> AppResult<()>;
    /// Newest first.
    async fn list_for_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<Notification>>;
    async fn count_unread(&self, user_id: &str) -> AppResult<u64>;
    async fn mark_read(&self, user_id: &str, id: &str) -> AppResult<()>;
    async fn mark_all_read(&self, user_id: &str) -> AppResult<u64>;
    async fn delete(&self, user_id: &str, id: &str) -> AppResult<()>;
    async fn ensure_indexes(&self) -> AppResult<()>;
}

fn notification_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Notification with id '{}' not found", id))
}

pub struct MongoNotificationRepository {
    collection: Collection<Notification>,
}

impl MongoNotificationRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection(NOTIFICATIONS);
        Self { collection }
    }
}

#[async_trait]
impl NotificationRepository for MongoNotificationRepository {
    async fn insert(&self, notification: &Notification) -> AppResult<()> {
        self.collection.insert_one(notification).await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<Notification>> {
        let find_options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(Some(limit))
            .build();

        let cursor = self
            .collection
            .find(doc! { "user_id": user_id })
            .with_options(find_options)
            .await?;
        let notifications: Vec<Notification> = cursor.try_collect().await?;
        Ok(notifications)
    }

    async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        let count = self
            .collection
            .count_documents(doc! { "user_id": user_id, "read": false })
            .await?;
        Ok(count)
    }

    async fn mark_read(&self, user_id: &str, id: &str) -> AppResult<()> {
        let result = self
            .collection
            .update_one(
                doc! { "id": id, "user_id": user_id },
                doc! { "$set": { "read": true } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(notification_not_found(id));
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "user_id": user_id, "read": false },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        let result = self
            .collection
            .delete_one(doc! { "id": id, "user_id": user_id })
            .await?;

        if result.deleted_count == 0 {
            return Err(notification_not_found(id));
        }
        Ok(())
    }

    async fn ensure_indexes(&self) -> AppResult<()> {
        let models = vec![
            IndexModel::builder()
                .keys(doc! { "id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "read": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(
                    IndexOptions::builder()
                        .expire_after(std::time::Duration::from_secs(0))
                        .build(),
                )
                .build(),
        ];
        self.collection.create_indexes(models).await?;

        log::info!("ensured indexes on '{}' (with TTL on expires_at)", NOTIFICATIONS);
        Ok(())
    }
}

/// Keeps notifications in process. Expired entries are hidden on read and
/// dropped on the next insert, the way the TTL index removes them in MongoDB.
#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    notifications: Arc<RwLock<HashMap<String, Notification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> AppResult<()> {
        let now = Utc::now();
        let mut notifications = self.notifications.write().await;
        notifications.retain(|_, n| !n.is_expired(now));
        if notifications.contains_key(&notification.id) {
            return Err(AppError::AlreadyExists(format!(
                "Notification with id '{}' already exists",
                notification.id
            )));
        }
        notifications.insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<Notification>> {
        let now = Utc::now();
        let notifications = self.notifications.read().await;
        let mut items: Vec<Notification> = notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_expired(now))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        let now = Utc::now();
        let notifications = self.notifications.read().await;
        Ok(notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.read && !n.is_expired(now))
            .count() as u64)
    }

    async fn mark_read(&self, user_id: &str, id: &str) -> AppResult<()> {
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(id) {
            Some(n) if n.user_id == user_id => {
                n.read = true;
                Ok(())
            }
            _ => Err(notification_not_found(id)),
        }
    }

    async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        let mut notifications = self.notifications.write().await;
        let mut updated = 0;
        for n in notifications.values_mut() {
            if n.user_id == user_id && !n.read {
                n.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        let mut notifications = self.notifications.write().await;
        match notifications.get(id) {
            Some(n) if n.user_id == user_id => {
                notifications.remove(id);
                Ok(())
            }
            _ => Err(notification_not_found(id)),
        }
    }

    async fn ensure_indexes(&self) -> AppResult<()> {
        Ok(())
    }
}
