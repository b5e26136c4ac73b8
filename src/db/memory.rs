use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::store::{Store, Transaction};
use crate::errors::AppResult;
use crate::models::domain::{Answer, Exam, ExamAttempt, Payment, Question, Role, User};

/// Every collection keyed by document id.
#[derive(Clone, Default)]
pub struct MemoryState {
    pub(crate) roles: HashMap<String, Role>,
    pub(crate) users: HashMap<String, User>,
    pub(crate) exams: HashMap<String, Exam>,
    pub(crate) questions: HashMap<String, Question>,
    pub(crate) attempts: HashMap<String, ExamAttempt>,
    pub(crate) attempt_slots: HashMap<(String, String), u64>,
    pub(crate) answers: HashMap<String, Answer>,
    pub(crate) payments: HashMap<String, Payment>,
}

/// In-process store for tests and local runs.
///
/// A transaction holds the store lock for its whole lifetime and works on a
/// copy of the state, so transactions are fully serialized and an abort is
/// just a dropped copy.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn ensure_indexes(&self) -> AppResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    pub(crate) working: MemoryState,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&mut self) -> AppResult<()> {
        *self.guard = self.working.clone();
        Ok(())
    }

    async fn abort(&mut self) -> AppResult<()> {
        self.working = self.guard.clone();
        Ok(())
    }
}
