use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::domain::role::DEFAULT_USER_ROLE;

/// Digest of a single-use token; the raw token only ever lives in the email.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenDigest {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenDigest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Success,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoginEvent {
    pub timestamp: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: LoginStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub browser: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            browser: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub email_verification: Option<TokenDigest>,
    pub password_reset: Option<TokenDigest>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
    #[serde(default)]
    pub login_history: Vec<LoginEvent>,
    #[serde(default)]
    pub logout_history: Vec<ActivityEvent>,
    #[serde(default)]
    pub verification_history: Vec<ActivityEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    pub fn new(name: &str, email: &str, password_hash: &str) -> Self {
        User {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash: password_hash.to_string(),
            role: DEFAULT_USER_ROLE.to_string(),
            profile_image: None,
            is_active: true,
            email_verified: false,
            verified_at: None,
            email_verification: None,
            password_reset: None,
            last_login: None,
            notification_preferences: NotificationPreferences::default(),
            login_history: Vec::new(),
            logout_history: Vec::new(),
            verification_history: Vec::new(),
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        }
    }

    pub fn can_authenticate(&self) -> bool {
        self.is_active && self.email_verified
    }

    /// Drops history entries older than the retention window.
    pub fn prune_history(&mut self, now: DateTime<Utc>, retention: Duration) {
        let cutoff = now - retention;
        self.login_history.retain(|e| e.timestamp >= cutoff);
        self.logout_history.retain(|e| e.timestamp >= cutoff);
        self.verification_history.retain(|e| e.timestamp >= cutoff);
    }

    pub fn touch(&mut self) {
        self.modified_at = Some(Utc::now());
    }
}

#[cfg(test)]
impl User {
    pub fn test_user(email: &str) -> Self {
        User::new("Test User", email, "not-a-real-hash")
    }
}
