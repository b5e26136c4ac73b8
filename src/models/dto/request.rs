use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use validator::Validate;

use crate::models::domain::{
    role::DEFAULT_USER_ROLE, user::NotificationPreferences, AnswerValue, ExamSettings,
    NotificationPayload, PaymentMethod, PaymentTarget,
};

static CURRENCY_REGEX: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^[A-Z]{3}$").expect("CURRENCY_REGEX is a valid regex pattern")
});

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_role() -> String {
    DEFAULT_USER_ROLE.to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1))]
    pub token: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    pub notification_preferences: Option<NotificationPreferences>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub new_password: String,
}

/// Accounts created by an administrator start out verified.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,

    #[serde(default = "default_role")]
    #[validate(length(min = 1, max = 50))]
    pub role: String,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 50))]
    pub role: Option<String>,

    pub is_active: Option<bool>,
}

/// Revenue window for the admin overview; defaults to the last 30 days.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverviewQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Create and update share the same payload; updates replace every field.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    #[validate(length(max = 5000))]
    pub instructions: Option<String>,

    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: i32,

    #[validate(range(min = 0.0))]
    pub passing_marks: f64,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub shuffle_questions: bool,

    #[serde(default = "default_true")]
    pub show_result: bool,

    #[serde(default)]
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,

    #[validate(range(min = -1))]
    pub attempts: i32,
}

impl From<ExamRequest> for ExamSettings {
    fn from(request: ExamRequest) -> Self {
        ExamSettings {
            title: request.title,
            description: request.description,
            instructions: request.instructions,
            duration_minutes: request.duration_minutes,
            passing_marks: request.passing_marks,
            start_time: request.start_time,
            end_time: request.end_time,
            shuffle_questions: request.shuffle_questions,
            show_result: request.show_result,
            price: request.price,
            attempts: request.attempts,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UnpublishRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUploadQuery {
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: String,
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReviewAnswerRequest {
    pub marks: f64,

    #[validate(length(max = 2000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(range(min = 0.0, message = "Amount cannot be negative"))]
    pub amount: f64,

    #[serde(default = "default_currency")]
    #[validate(regex(
        path = *CURRENCY_REGEX,
        message = "Currency code must be 3 uppercase letters"
    ))]
    pub currency: String,

    pub payment_method: PaymentMethod,
    pub payment_for: PaymentTarget,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CompletePaymentRequest {
    #[validate(length(min = 1, max = 200))]
    pub transaction_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FailPaymentRequest {
    #[validate(length(min = 1, max = 100))]
    pub code: String,

    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentStatisticsQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: String,

    #[validate(length(min = 1, max = 100))]
    pub display_name: String,

    pub description: Option<String>,

    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BroadcastRequest {
    #[validate(length(min = 1, max = 1000))]
    pub user_ids: Vec<String>,

    pub notification: NotificationPayload,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaginationParams {
    #[validate(range(min = 0))]
    pub offset: Option<i64>,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            offset: Some(0),
            limit: Some(20),
        }
    }
}

impl PaginationParams {
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

/// Query string for exam listings. Pagination fields are inlined because
/// `serde(flatten)` does not parse numbers out of query strings.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ExamListQuery {
    pub published: Option<bool>,

    pub created_by: Option<String>,

    #[validate(range(min = 0))]
    pub offset: Option<i64>,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
}

impl ExamListQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn exam_request() -> ExamRequest {
        serde_json::from_value(serde_json::json!({
            "title": "Chemistry",
            "duration_minutes": 45,
            "passing_marks": 20.0,
            "attempts": -1
        }))
        .expect("minimal exam request should parse")
    }

    #[test]
    fn test_valid_register_request() {
        let request = RegisterRequest {
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            password: "correct horse".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_short_password_rejected() {
        let request = RegisterRequest {
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            password: "short".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_exam_request_defaults() {
        let request = exam_request();
        assert!(request.validate().is_ok());
        assert!(request.show_result);
        assert!(!request.shuffle_questions);
        assert_eq!(request.price, 0.0);
    }

    #[test]
    fn test_exam_request_rejects_zero_duration() {
        let mut request = exam_request();
        request.duration_minutes = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_currency_must_be_three_uppercase_letters() {
        let mut request: RecordPaymentRequest = serde_json::from_value(serde_json::json!({
            "amount": 100.0,
            "currency": "usd",
            "payment_method": "stripe",
            "payment_for": { "type": "exam", "item_id": "exam-1" }
        }))
        .unwrap();
        assert!(request.validate().is_err());

        request.currency = "USD".to_string();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_submit_answer_parses_tagged_value() {
        let request: SubmitAnswerRequest = serde_json::from_value(serde_json::json!({
            "question_id": "q-1",
            "answer": { "type": "multiple_choice", "selected": [0, 2] }
        }))
        .unwrap();
        assert_eq!(
            request.answer,
            AnswerValue::MultipleChoice {
                selected: vec![0, 2]
            }
        );
    }

    #[test]
    fn test_create_user_request_defaults() {
        let request: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Edsger",
            "email": "edsger@example.com",
            "password": "goto considered"
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.role, DEFAULT_USER_ROLE);
        assert!(request.is_active);
    }

    #[test]
    fn test_change_password_requires_long_new_password() {
        let request = ChangePasswordRequest {
            current_password: "old one".to_string(),
            new_password: "short".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_pagination_limits() {
        let params = PaginationParams {
            offset: None,
            limit: Some(1000),
        };
        assert_eq!(params.offset(), 0);
        assert_eq!(params.limit(), 100);
    }
}
