use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{AppError, AppResult};

pub const TEMPLATE_VERIFY_EMAIL: &str = "verify_email";
pub const TEMPLATE_WELCOME: &str = "welcome";
pub const TEMPLATE_RESET_PASSWORD: &str = "reset_password";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub recipient: String,
    pub template: String,
    pub data: Value,
}

impl EmailMessage {
    pub fn new(recipient: &str, template: &str, data: Value) -> Self {
        Self {
            recipient: recipient.to_string(),
            template: template.to_string(),
            data,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> AppResult<()>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: EmailMessage) -> AppResult<()> {
        log::info!(
            "email '{}' to {}: {}",
            message.template,
            message.recipient,
            message.data
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    template: &'a str,
    data: &'a Value,
}

/// Posts messages as JSON to a mail relay service.
pub struct HttpEmailSender {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(relay_url: &str, from: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            relay_url: relay_url.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: EmailMessage) -> AppResult<()> {
        let body = RelayRequest {
            from: &self.from,
            to: &message.recipient,
            template: &message.template,
            data: &message.data,
        };

        let response = self
            .client
            .post(&self.relay_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::DependencyFailure(format!("Email relay unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::DependencyFailure(format!(
                "Email relay rejected '{}' message with status {}",
                message.template,
                response.status()
            )));
        }
        Ok(())
    }
}
