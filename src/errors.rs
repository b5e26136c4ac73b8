use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid answer format: {0}")]
    InvalidAnswerFormat(String),

    #[error("Awarded marks {awarded} exceed the question's {max} marks")]
    MarksExceedQuestion { awarded: f64, max: f64 },

    #[error("A refund reason is required")]
    RefundReasonRequired,

    #[error("Exam '{0}' is published and cannot be modified")]
    ExamPublished(String),

    #[error("Attempt limit of {limit} reached for this exam")]
    AttemptLimitExceeded { limit: i32 },

    #[error("Exam is not available: {0}")]
    ExamNotAvailable(String),

    #[error("Invalid state transition from '{from}' to '{to}'")]
    InvalidStateTransition { from: String, to: String },

    #[error("Attempt '{0}' is past its deadline")]
    AttemptExpired(String),

    #[error("Exam '{0}' has active attempts")]
    ActiveAttempts(String),

    #[error("Exam '{0}' has recorded attempts")]
    ExamHasAttempts(String),

    #[error("Question '{0}' has recorded answers")]
    QuestionHasAnswers(String),

    #[error("Attempt '{0}' has answers awaiting review")]
    PendingReview(String),

    #[error("Role '{0}' is a system role and cannot be deleted")]
    SystemRoleProtected(String),

    #[error("Concurrent modification, please retry: {0}")]
    TransactionConflict(String),

    #[error("Refund of {requested} exceeds the payment amount of {available}")]
    RefundExceedsAmount { requested: f64, available: f64 },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidAnswerFormat(_) => "INVALID_ANSWER_FORMAT",
            AppError::MarksExceedQuestion { .. } => "MARKS_EXCEED_QUESTION",
            AppError::RefundReasonRequired => "REFUND_REASON_REQUIRED",
            AppError::ExamPublished(_) => "EXAM_PUBLISHED",
            AppError::AttemptLimitExceeded { .. } => "ATTEMPT_LIMIT_EXCEEDED",
            AppError::ExamNotAvailable(_) => "EXAM_NOT_AVAILABLE",
            AppError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            AppError::AttemptExpired(_) => "ATTEMPT_EXPIRED",
            AppError::ActiveAttempts(_) => "ACTIVE_ATTEMPTS",
            AppError::ExamHasAttempts(_) => "EXAM_HAS_ATTEMPTS",
            AppError::QuestionHasAnswers(_) => "QUESTION_HAS_ANSWERS",
            AppError::PendingReview(_) => "PENDING_REVIEW",
            AppError::SystemRoleProtected(_) => "SYSTEM_ROLE_PROTECTED",
            AppError::TransactionConflict(_) => "TRANSACTION_CONFLICT",
            AppError::RefundExceedsAmount { .. } => "REFUND_EXCEEDS_AMOUNT",
            AppError::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            AppError::DependencyFailure(_) => "DEPENDENCY_FAILURE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors whose detail must not leak to the caller.
    fn is_opaque(&self) -> bool {
        matches!(
            self,
            AppError::IntegrityViolation(_)
                | AppError::DatabaseError(_)
                | AppError::InternalError(_)
                | AppError::DependencyFailure(_)
        )
    }

    pub fn state_transition(from: impl ToString, to: impl ToString) -> Self {
        AppError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_)
            | AppError::InvalidAnswerFormat(_)
            | AppError::MarksExceedQuestion { .. }
            | AppError::RefundReasonRequired => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_)
            | AppError::ExamPublished(_)
            | AppError::AttemptLimitExceeded { .. }
            | AppError::ExamNotAvailable(_)
            | AppError::InvalidStateTransition { .. }
            | AppError::AttemptExpired(_)
            | AppError::ActiveAttempts(_)
            | AppError::ExamHasAttempts(_)
            | AppError::QuestionHasAnswers(_)
            | AppError::PendingReview(_)
            | AppError::SystemRoleProtected(_)
            | AppError::TransactionConflict(_) => StatusCode::CONFLICT,
            AppError::RefundExceedsAmount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::DependencyFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::IntegrityViolation(_)
            | AppError::DatabaseError(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.is_opaque() {
            log::error!("request failed: {}", self);
            "An unexpected error occurred. Please try again later.".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: message,
            code: self.error_code(),
            status: self.status_code().as_u16(),
        })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            AppError::TransactionConflict(err.to_string())
        } else if is_duplicate_key(&err) {
            AppError::AlreadyExists(err.to_string())
        } else {
            AppError::DatabaseError(err.to_string())
        }
    }
}
impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::InternalError(format!("BSON serialization error: {}", err))
    }
}
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
