use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Razorpay,
    Stripe,
    Paypal,
}

/// What a payment buys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentTarget {
    Course { item_id: String },
    Exam { item_id: String },
}

impl PaymentTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentTarget::Course { .. } => "course",
            PaymentTarget::Exam { .. } => "exam",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processed,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Refund {
    pub reason: String,
    pub amount: f64,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: RefundStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub payment_for: PaymentTarget,
    pub refund: Option<Refund>,
    pub error: Option<PaymentErrorInfo>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Amounts are kept to two decimal places.
pub fn round_amount(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

impl Payment {
    pub fn pending(
        user_id: &str,
        amount: f64,
        currency: &str,
        method: PaymentMethod,
        target: PaymentTarget,
    ) -> Self {
        Payment {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount: round_amount(amount),
            currency: currency.trim().to_uppercase(),
            status: PaymentStatus::Pending,
            payment_method: method,
            transaction_id: None,
            payment_for: target,
            refund: None,
            error: None,
            ip_address: None,
            user_agent: None,
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        }
    }

    fn transition(&mut self, next: PaymentStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::state_transition(self.status, next));
        }
        self.status = next;
        self.modified_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, transaction_id: &str) -> AppResult<()> {
        self.transition(PaymentStatus::Completed)?;
        self.transaction_id = Some(transaction_id.to_string());
        Ok(())
    }

    pub fn fail(&mut self, code: &str, message: &str) -> AppResult<()> {
        self.transition(PaymentStatus::Failed)?;
        self.error = Some(PaymentErrorInfo {
            code: code.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    /// Refunds a completed payment. Nothing changes unless every check passes.
    pub fn refund(&mut self, reason: Option<&str>, amount: f64) -> AppResult<()> {
        if !self.status.can_transition_to(PaymentStatus::Refunded) {
            return Err(AppError::state_transition(
                self.status,
                PaymentStatus::Refunded,
            ));
        }
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(AppError::RefundReasonRequired)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::ValidationError(
                "Refund amount must be greater than zero".into(),
            ));
        }
        let amount = round_amount(amount);
        if amount > self.amount {
            return Err(AppError::RefundExceedsAmount {
                requested: amount,
                available: self.amount,
            });
        }

        self.transition(PaymentStatus::Refunded)?;
        let now = Utc::now();
        self.refund = Some(Refund {
            reason: reason.to_string(),
            amount,
            requested_at: now,
            processed_at: Some(now),
            status: RefundStatus::Processed,
        });
        Ok(())
    }
}
