use async_trait::async_trait;
use mongodb::{bson::Document, ClientSession, Collection};

use crate::db::store::{Store, Transaction};
use crate::db::Database;
use crate::errors::AppResult;
use crate::models::domain::{Answer, Exam, ExamAttempt, Payment, Question, Role, User};
use crate::repositories::{
    answer_repository, attempt_repository, exam_repository, payment_repository,
    question_repository, role_repository, user_repository,
};

pub const ROLES: &str = "roles";
pub const USERS: &str = "users";
pub const EXAMS: &str = "exams";
pub const QUESTIONS: &str = "questions";
pub const ATTEMPTS: &str = "exam_attempts";
pub const ATTEMPT_SLOTS: &str = "attempt_slots";
pub const ANSWERS: &str = "answers";
pub const PAYMENTS: &str = "payments";
pub const NOTIFICATIONS: &str = "notifications";

/// MongoDB-backed store. Transactions are client-session transactions and
/// need a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let mut session = self.db.client().start_session().await?;
        session.start_transaction().await?;

        Ok(Box::new(MongoTransaction {
            session,
            roles: self.db.get_collection(ROLES),
            users: self.db.get_collection(USERS),
            exams: self.db.get_collection(EXAMS),
            questions: self.db.get_collection(QUESTIONS),
            attempts: self.db.get_collection(ATTEMPTS),
            attempt_slots: self.db.get_collection(ATTEMPT_SLOTS),
            answers: self.db.get_collection(ANSWERS),
            payments: self.db.get_collection(PAYMENTS),
        }))
    }

    async fn ensure_indexes(&self) -> AppResult<()> {
        role_repository::ensure_indexes(&self.db).await?;
        user_repository::ensure_indexes(&self.db).await?;
        exam_repository::ensure_indexes(&self.db).await?;
        question_repository::ensure_indexes(&self.db).await?;
        attempt_repository::ensure_indexes(&self.db).await?;
        answer_repository::ensure_indexes(&self.db).await?;
        payment_repository::ensure_indexes(&self.db).await?;
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        self.db.health_check().await
    }
}

pub struct MongoTransaction {
    pub(crate) session: ClientSession,
    pub(crate) roles: Collection<Role>,
    pub(crate) users: Collection<User>,
    pub(crate) exams: Collection<Exam>,
    pub(crate) questions: Collection<Question>,
    pub(crate) attempts: Collection<ExamAttempt>,
    pub(crate) attempt_slots: Collection<Document>,
    pub(crate) answers: Collection<Answer>,
    pub(crate) payments: Collection<Payment>,
}

#[async_trait]
impl Transaction for MongoTransaction {
    async fn commit(&mut self) -> AppResult<()> {
        self.session.commit_transaction().await?;
        Ok(())
    }

    async fn abort(&mut self) -> AppResult<()> {
        self.session.abort_transaction().await?;
        Ok(())
    }
}
