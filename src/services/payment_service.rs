use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::{
    db::{finish, Store, Transaction},
    errors::{AppError, AppResult},
    models::{
        domain::{
            payment::round_amount, ClientInfo, NotificationKind, NotificationPayload, Payment,
        },
        dto::{request::RecordPaymentRequest, response::PaymentTotal},
    },
    services::notification_service::NotificationService,
};

async fn load_payment(tx: &mut dyn Transaction, payment_id: &str) -> AppResult<Payment> {
    tx.find_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Payment with id '{}' not found", payment_id)))
}

fn payment_notice(payment: &Payment, title: &str, message: String) -> NotificationPayload {
    NotificationPayload {
        kind: NotificationKind::Payment,
        title: title.to_string(),
        message,
        link: format!("/api/payments/{}", payment.id),
    }
}

/// Groups completed payments by what they bought and their currency.
fn totals(payments: &[Payment]) -> Vec<PaymentTotal> {
    let mut grouped: BTreeMap<(&str, &str), (f64, u64)> = BTreeMap::new();
    for payment in payments {
        let entry = grouped
            .entry((payment.payment_for.kind(), payment.currency.as_str()))
            .or_insert((0.0, 0));
        entry.0 += payment.amount;
        entry.1 += 1;
    }

    grouped
        .into_iter()
        .map(|((payment_for, currency), (total, count))| PaymentTotal {
            payment_for: payment_for.to_string(),
            currency: currency.to_string(),
            total_amount: round_amount(total),
            count,
        })
        .collect()
}

pub struct PaymentService {
    store: Arc<dyn Store>,
    notifications: Arc<NotificationService>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, notifications: Arc<NotificationService>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn record_payment(
        &self,
        user_id: &str,
        request: RecordPaymentRequest,
        client: ClientInfo,
    ) -> AppResult<Payment> {
        request.validate()?;

        let mut payment = Payment::pending(
            user_id,
            request.amount,
            &request.currency,
            request.payment_method,
            request.payment_for,
        );
        payment.ip_address = client.ip_address;
        payment.user_agent = client.browser_info;

        let mut tx = self.store.begin().await?;
        let outcome = tx.insert_payment(&payment).await;
        finish(tx, outcome).await?;

        log::info!(
            "payment '{}' of {} {} recorded for '{}'",
            payment.id,
            payment.amount,
            payment.currency,
            user_id
        );
        Ok(payment)
    }

    pub async fn mark_completed(&self, payment_id: &str, transaction_id: &str) -> AppResult<Payment> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::complete_in(tx.as_mut(), payment_id, transaction_id).await;
        let payment = finish(tx, outcome).await?;

        log::info!("payment '{}' completed", payment.id);
        let notice = payment_notice(
            &payment,
            "Payment successful",
            format!(
                "Your payment of {} {} was received",
                payment.amount, payment.currency
            ),
        );
        self.notifications
            .notify_best_effort(&payment.user_id, notice)
            .await;
        Ok(payment)
    }

    async fn complete_in(
        tx: &mut dyn Transaction,
        payment_id: &str,
        transaction_id: &str,
    ) -> AppResult<Payment> {
        let mut payment = load_payment(tx, payment_id).await?;
        payment.complete(transaction_id)?;
        tx.replace_payment(&payment).await?;
        Ok(payment)
    }

    pub async fn mark_failed(&self, payment_id: &str, code: &str, message: &str) -> AppResult<Payment> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::fail_in(tx.as_mut(), payment_id, code, message).await;
        let payment = finish(tx, outcome).await?;

        log::info!("payment '{}' failed with code '{}'", payment.id, code);
        let notice = payment_notice(
            &payment,
            "Payment failed",
            format!(
                "Your payment of {} {} could not be processed",
                payment.amount, payment.currency
            ),
        );
        self.notifications
            .notify_best_effort(&payment.user_id, notice)
            .await;
        Ok(payment)
    }

    async fn fail_in(
        tx: &mut dyn Transaction,
        payment_id: &str,
        code: &str,
        message: &str,
    ) -> AppResult<Payment> {
        let mut payment = load_payment(tx, payment_id).await?;
        payment.fail(code, message)?;
        tx.replace_payment(&payment).await?;
        Ok(payment)
    }

    pub async fn refund(
        &self,
        payment_id: &str,
        reason: Option<&str>,
        amount: f64,
    ) -> AppResult<Payment> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::refund_in(tx.as_mut(), payment_id, reason, amount).await;
        let payment = finish(tx, outcome).await?;

        let refunded = payment.refund.as_ref().map_or(0.0, |r| r.amount);
        log::info!("payment '{}' refunded {}", payment.id, refunded);
        let notice = payment_notice(
            &payment,
            "Refund processed",
            format!("A refund of {} {} was processed", refunded, payment.currency),
        );
        self.notifications
            .notify_best_effort(&payment.user_id, notice)
            .await;
        Ok(payment)
    }

    async fn refund_in(
        tx: &mut dyn Transaction,
        payment_id: &str,
        reason: Option<&str>,
        amount: f64,
    ) -> AppResult<Payment> {
        let mut payment = load_payment(tx, payment_id).await?;
        payment.refund(reason, amount)?;
        tx.replace_payment(&payment).await?;
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: &str) -> AppResult<Payment> {
        let mut tx = self.store.begin().await?;
        let outcome = load_payment(tx.as_mut(), payment_id).await;
        finish(tx, outcome).await
    }

    pub async fn list_user_payments(&self, user_id: &str) -> AppResult<Vec<Payment>> {
        let mut tx = self.store.begin().await?;
        let outcome = tx.list_user_payments(user_id).await;
        finish(tx, outcome).await
    }

    /// Completed totals within `[from, to]`, grouped by target kind and currency.
    pub async fn statistics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<PaymentTotal>> {
        if from > to {
            return Err(AppError::ValidationError(
                "Statistics range start must not be after its end".into(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = tx.list_completed_between(from, to).await;
        let payments = finish(tx, outcome).await?;
        Ok(totals(&payments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::domain::{PaymentMethod, PaymentStatus, PaymentTarget};
    use crate::repositories::InMemoryNotificationRepository;
    use chrono::Duration;

    struct Fixture {
        payments: PaymentService,
        notifications: Arc<NotificationService>,
    }

    fn fixture() -> Fixture {
        let notifications = Arc::new(NotificationService::new(
            Arc::new(InMemoryNotificationRepository::new()),
            30,
        ));
        Fixture {
            payments: PaymentService::new(Arc::new(MemoryStore::new()), notifications.clone()),
            notifications,
        }
    }

    fn request(amount: f64, currency: &str, target: PaymentTarget) -> RecordPaymentRequest {
        RecordPaymentRequest {
            amount,
            currency: currency.to_string(),
            payment_method: PaymentMethod::Stripe,
            payment_for: target,
        }
    }

    fn exam_target() -> PaymentTarget {
        PaymentTarget::Exam {
            item_id: "exam-1".into(),
        }
    }

    #[tokio::test]
    async fn refund_lifecycle() {
        let f = fixture();
        let payment = f
            .payments
            .record_payment("buyer", request(100.0, "USD", exam_target()), ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        // Pending payments cannot be refunded.
        assert!(matches!(
            f.payments.refund(&payment.id, Some("changed mind"), 10.0).await,
            Err(AppError::InvalidStateTransition { .. })
        ));

        f.payments.mark_completed(&payment.id, "txn-1").await.unwrap();

        assert!(matches!(
            f.payments.refund(&payment.id, Some("x"), 150.0).await,
            Err(AppError::RefundExceedsAmount { .. })
        ));
        assert!(matches!(
            f.payments.refund(&payment.id, Some("   "), 50.0).await,
            Err(AppError::RefundReasonRequired)
        ));
        let unchanged = f.payments.get_payment(&payment.id).await.unwrap();
        assert_eq!(unchanged.status, PaymentStatus::Completed);
        assert!(unchanged.refund.is_none());

        let refunded = f
            .payments
            .refund(&payment.id, Some("duplicate charge"), 50.0)
            .await
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        let refund = refunded.refund.unwrap();
        assert_eq!(refund.amount, 50.0);
        assert!(refund.processed_at.is_some());

        assert_eq!(f.notifications.unread_count("buyer").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn completion_and_failure_only_from_pending() {
        let f = fixture();
        let payment = f
            .payments
            .record_payment("buyer", request(20.0, "EUR", exam_target()), ClientInfo::default())
            .await
            .unwrap();

        let failed = f
            .payments
            .mark_failed(&payment.id, "card_declined", "Card declined")
            .await
            .unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.error.unwrap().code, "card_declined");

        assert!(f.payments.mark_completed(&payment.id, "txn").await.is_err());
        assert!(f
            .payments
            .mark_failed(&payment.id, "again", "again")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn transaction_ids_are_unique() {
        let f = fixture();
        let first = f
            .payments
            .record_payment("a", request(5.0, "USD", exam_target()), ClientInfo::default())
            .await
            .unwrap();
        let second = f
            .payments
            .record_payment("b", request(5.0, "USD", exam_target()), ClientInfo::default())
            .await
            .unwrap();

        f.payments.mark_completed(&first.id, "txn-dup").await.unwrap();
        assert!(matches!(
            f.payments.mark_completed(&second.id, "txn-dup").await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn invalid_currency_is_rejected() {
        let f = fixture();
        let result = f
            .payments
            .record_payment("a", request(5.0, "usd", exam_target()), ClientInfo::default())
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn statistics_group_completed_payments() {
        let f = fixture();
        let course = PaymentTarget::Course {
            item_id: "course-1".into(),
        };
        for (amount, currency, target, complete) in [
            (10.0, "USD", exam_target(), true),
            (15.5, "USD", exam_target(), true),
            (7.0, "EUR", exam_target(), true),
            (30.0, "USD", course.clone(), true),
            (99.0, "USD", course, false),
        ] {
            let payment = f
                .payments
                .record_payment("buyer", request(amount, currency, target), ClientInfo::default())
                .await
                .unwrap();
            if complete {
                f.payments
                    .mark_completed(&payment.id, &format!("txn-{}", payment.id))
                    .await
                    .unwrap();
            }
        }

        let now = Utc::now();
        let stats = f
            .payments
            .statistics(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(
            stats,
            vec![
                PaymentTotal {
                    payment_for: "course".into(),
                    currency: "USD".into(),
                    total_amount: 30.0,
                    count: 1,
                },
                PaymentTotal {
                    payment_for: "exam".into(),
                    currency: "EUR".into(),
                    total_amount: 7.0,
                    count: 1,
                },
                PaymentTotal {
                    payment_for: "exam".into(),
                    currency: "USD".into(),
                    total_amount: 25.5,
                    count: 2,
                },
            ]
        );

        assert!(f.payments.statistics(now, now - Duration::hours(1)).await.is_err());
    }
}
