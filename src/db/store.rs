use async_trait::async_trait;

use crate::errors::AppResult;
use crate::repositories::{
    AnswerRepository, AttemptRepository, ExamRepository, PaymentRepository, QuestionRepository,
    RoleRepository, UserRepository,
};

/// Entry point to the document store. Every multi-document mutation goes
/// through a [`Transaction`] obtained from [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn Transaction>>;
    async fn ensure_indexes(&self) -> AppResult<()>;
    async fn health_check(&self) -> AppResult<()>;
}

/// A unit of work. Writes become visible to other transactions only after
/// [`Transaction::commit`]; dropping an uncommitted transaction discards them.
#[async_trait]
pub trait Transaction:
    RoleRepository
    + UserRepository
    + ExamRepository
    + QuestionRepository
    + AttemptRepository
    + AnswerRepository
    + PaymentRepository
    + Send
{
    async fn commit(&mut self) -> AppResult<()>;
    async fn abort(&mut self) -> AppResult<()>;
}

/// Commits on success and aborts on failure, returning the original outcome.
pub async fn finish<T>(mut tx: Box<dyn Transaction>, outcome: AppResult<T>) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = tx.abort().await {
                log::warn!("failed to abort transaction after '{}': {}", err, abort_err);
            }
            Err(err)
        }
    }
}
