use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{IndexOptions, ReplaceOptions},
    IndexModel,
};

use crate::{
    db::{memory::MemoryTransaction, mongo::MongoTransaction, mongo::PAYMENTS, Database},
    errors::{AppError, AppResult},
    models::domain::{Payment, PaymentStatus},
};

#[async_trait]
pub trait PaymentRepository: Send {
    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()>;
    async fn find_payment(&mut self, id: &str) -> AppResult<Option<Payment>>;
    async fn replace_payment(&mut self, payment: &Payment) -> AppResult<()>;
    async fn list_user_payments(&mut self, user_id: &str) -> AppResult<Vec<Payment>>;
    /// Completed payments created within `[from, to]`.
    async fn list_completed_between(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Payment>>;
}

fn payment_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Payment with id '{}' not found", id))
}

fn created_within(payment: &Payment, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    payment
        .created_at
        .is_some_and(|created| created >= from && created <= to)
}

#[async_trait]
impl PaymentRepository for MongoTransaction {
    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()> {
        self.payments
            .insert_one(payment)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn find_payment(&mut self, id: &str) -> AppResult<Option<Payment>> {
        let payment = self
            .payments
            .find_one(doc! { "id": id })
            .session(&mut self.session)
            .await?;
        Ok(payment)
    }

    async fn replace_payment(&mut self, payment: &Payment) -> AppResult<()> {
        let options = ReplaceOptions::builder().upsert(false).build();
        let result = self
            .payments
            .replace_one(doc! { "id": &payment.id }, payment)
            .with_options(options)
            .session(&mut self.session)
            .await?;

        if result.matched_count == 0 {
            return Err(payment_not_found(&payment.id));
        }
        Ok(())
    }

    async fn list_user_payments(&mut self, user_id: &str) -> AppResult<Vec<Payment>> {
        let mut cursor = self
            .payments
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": -1 })
            .session(&mut self.session)
            .await?;
        let payments: Vec<Payment> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(payments)
    }

    async fn list_completed_between(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Payment>> {
        let mut cursor = self
            .payments
            .find(doc! { "status": "completed" })
            .session(&mut self.session)
            .await?;
        let completed: Vec<Payment> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(completed
            .into_iter()
            .filter(|p| created_within(p, from, to))
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for MemoryTransaction {
    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()> {
        if self.working.payments.contains_key(&payment.id) {
            return Err(AppError::AlreadyExists(format!(
                "Payment with id '{}' already exists",
                payment.id
            )));
        }
        self.working
            .payments
            .insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_payment(&mut self, id: &str) -> AppResult<Option<Payment>> {
        Ok(self.working.payments.get(id).cloned())
    }

    async fn replace_payment(&mut self, payment: &Payment) -> AppResult<()> {
        if let Some(txn) = &payment.transaction_id {
            let taken = self
                .working
                .payments
                .values()
                .any(|p| p.id != payment.id && p.transaction_id.as_ref() == Some(txn));
            if taken {
                return Err(AppError::AlreadyExists(format!(
                    "Transaction '{}' is already recorded",
                    txn
                )));
            }
        }
        match self.working.payments.get_mut(&payment.id) {
            Some(existing) => {
                *existing = payment.clone();
                Ok(())
            }
            None => Err(payment_not_found(&payment.id)),
        }
    }

    async fn list_user_payments(&mut self, user_id: &str) -> AppResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .working
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn list_completed_between(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Completed && created_within(p, from, to))
            .cloned()
            .collect())
    }
}

pub async fn ensure_indexes(db: &Database) -> AppResult<()> {
    let payments = db.get_collection::<Payment>(PAYMENTS);

    let models = vec![
        IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "transaction_id": 1 })
            .options(IndexOptions::builder().unique(true).sparse(true).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .build(),
        IndexModel::builder().keys(doc! { "status": 1 }).build(),
    ];
    payments.create_indexes(models).await?;

    log::info!("ensured indexes on '{}'", PAYMENTS);
    Ok(())
}
