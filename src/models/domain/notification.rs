use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_NOTIFICATION_TTL_DAYS: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Exam,
    Course,
    System,
    Payment,
}

/// The user-facing part of a notification, shared by single and batch sends.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    /// Stored as a native BSON date so the TTL index can expire it.
    pub expires_at: mongodb::bson::DateTime,
}

impl Notification {
    pub fn new(user_id: &str, payload: NotificationPayload, ttl: Duration) -> Self {
        let now = Utc::now();
        Notification {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: payload.kind,
            title: payload.title,
            message: payload.message,
            link: payload.link,
            read: false,
            created_at: now,
            expires_at: mongodb::bson::DateTime::from_millis((now + ttl).timestamp_millis()),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.timestamp_millis() <= now.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_notification_is_unread_and_expires_later() {
        let payload = NotificationPayload {
            kind: NotificationKind::Exam,
            title: "Result ready".into(),
            message: "Your exam was evaluated".into(),
            link: "/exams/1".into(),
        };
        let notification = Notification::new(
            "user-1",
            payload,
            Duration::days(DEFAULT_NOTIFICATION_TTL_DAYS),
        );

        assert!(!notification.read);
        assert!(!notification.is_expired(Utc::now()));
        assert!(notification.is_expired(Utc::now() + Duration::days(31)));
    }
}
