use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime},
    options::{IndexOptions, ReplaceOptions, UpdateOptions},
    IndexModel,
};

use crate::{
    db::{
        memory::MemoryTransaction,
        mongo::{MongoTransaction, ATTEMPTS, ATTEMPT_SLOTS},
        Database,
    },
    errors::{AppError, AppResult},
    models::domain::{AttemptStatus, ExamAttempt},
    repositories::page,
};

#[async_trait]
pub trait AttemptRepository: Send {
    async fn insert_attempt(&mut self, attempt: &ExamAttempt) -> AppResult<()>;
    async fn find_attempt(&mut self, id: &str) -> AppResult<Option<ExamAttempt>>;
    async fn replace_attempt(&mut self, attempt: &ExamAttempt) -> AppResult<()>;
    /// Attempts of a user on an exam that still count toward the limit.
    async fn count_counted_attempts(&mut self, user_id: &str, exam_id: &str) -> AppResult<u64>;
    /// Attempts on an exam in any of `statuses`; an empty slice counts every attempt.
    async fn count_exam_attempts(
        &mut self,
        exam_id: &str,
        statuses: &[AttemptStatus],
    ) -> AppResult<u64>;
    async fn list_exam_attempts(&mut self, exam_id: &str) -> AppResult<Vec<ExamAttempt>>;
    async fn list_user_attempts(&mut self, user_id: &str) -> AppResult<Vec<ExamAttempt>>;
    /// Every exam's attempts, newest first, with the total count.
    async fn list_attempts(&mut self, offset: i64, limit: i64) -> AppResult<(Vec<ExamAttempt>, i64)>;
    async fn list_expired_attempts(&mut self, now: DateTime<Utc>) -> AppResult<Vec<ExamAttempt>>;
    /// Writes the per-(user, exam) slot document so concurrent starts touch the same record.
    async fn claim_attempt_slot(&mut self, user_id: &str, exam_id: &str) -> AppResult<()>;
}

fn attempt_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Attempt with id '{}' not found", id))
}

fn status_values(statuses: &[AttemptStatus]) -> Vec<Bson> {
    statuses
        .iter()
        .map(|s| Bson::String(s.as_str().to_string()))
        .collect()
}

#[async_trait]
impl AttemptRepository for MongoTransaction {
    async fn insert_attempt(&mut self, attempt: &ExamAttempt) -> AppResult<()> {
        self.attempts
            .insert_one(attempt)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn find_attempt(&mut self, id: &str) -> AppResult<Option<ExamAttempt>> {
        let attempt = self
            .attempts
            .find_one(doc! { "id": id })
            .session(&mut self.session)
            .await?;
        Ok(attempt)
    }

    async fn replace_attempt(&mut self, attempt: &ExamAttempt) -> AppResult<()> {
        let options = ReplaceOptions::builder().upsert(false).build();
        let result = self
            .attempts
            .replace_one(doc! { "id": &attempt.id }, attempt)
            .with_options(options)
            .session(&mut self.session)
            .await?;

        if result.matched_count == 0 {
            return Err(attempt_not_found(&attempt.id));
        }
        Ok(())
    }

    async fn count_counted_attempts(&mut self, user_id: &str, exam_id: &str) -> AppResult<u64> {
        let count = self
            .attempts
            .count_documents(doc! {
                "user_id": user_id,
                "exam_id": exam_id,
                "dropped_at": Bson::Null,
            })
            .session(&mut self.session)
            .await?;
        Ok(count)
    }

    async fn count_exam_attempts(
        &mut self,
        exam_id: &str,
        statuses: &[AttemptStatus],
    ) -> AppResult<u64> {
        let mut filter = doc! { "exam_id": exam_id };
        if !statuses.is_empty() {
            filter.insert("status", doc! { "$in": status_values(statuses) });
        }
        let count = self
            .attempts
            .count_documents(filter)
            .session(&mut self.session)
            .await?;
        Ok(count)
    }

    async fn list_exam_attempts(&mut self, exam_id: &str) -> AppResult<Vec<ExamAttempt>> {
        let mut cursor = self
            .attempts
            .find(doc! { "exam_id": exam_id, "dropped_at": Bson::Null })
            .session(&mut self.session)
            .await?;
        let attempts: Vec<ExamAttempt> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(attempts)
    }

    async fn list_user_attempts(&mut self, user_id: &str) -> AppResult<Vec<ExamAttempt>> {
        let mut cursor = self
            .attempts
            .find(doc! { "user_id": user_id, "dropped_at": Bson::Null })
            .sort(doc! { "created_at": -1 })
            .session(&mut self.session)
            .await?;
        let attempts: Vec<ExamAttempt> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(attempts)
    }

    async fn list_attempts(&mut self, offset: i64, limit: i64) -> AppResult<(Vec<ExamAttempt>, i64)> {
        let filter = doc! { "dropped_at": Bson::Null };
        let total = self
            .attempts
            .count_documents(filter.clone())
            .session(&mut self.session)
            .await? as i64;

        let mut cursor = self
            .attempts
            .find(filter)
            .skip(offset.max(0) as u64)
            .limit(limit)
            .sort(doc! { "created_at": -1 })
            .session(&mut self.session)
            .await?;
        let attempts: Vec<ExamAttempt> = cursor.stream(&mut self.session).try_collect().await?;

        Ok((attempts, total))
    }

    async fn list_expired_attempts(&mut self, now: DateTime<Utc>) -> AppResult<Vec<ExamAttempt>> {
        // Deadlines are stored as RFC 3339 strings, so the time comparison happens here.
        let mut cursor = self
            .attempts
            .find(doc! { "status": AttemptStatus::InProgress.as_str() })
            .session(&mut self.session)
            .await?;
        let in_progress: Vec<ExamAttempt> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(in_progress
            .into_iter()
            .filter(|a| a.is_expired(now))
            .collect())
    }

    async fn claim_attempt_slot(&mut self, user_id: &str, exam_id: &str) -> AppResult<()> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.attempt_slots
            .update_one(
                doc! { "user_id": user_id, "exam_id": exam_id },
                doc! {
                    "$inc": { "starts": 1 },
                    "$set": { "modified_at": BsonDateTime::now() },
                },
            )
            .with_options(options)
            .session(&mut self.session)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for MemoryTransaction {
    async fn insert_attempt(&mut self, attempt: &ExamAttempt) -> AppResult<()> {
        if self.working.attempts.contains_key(&attempt.id) {
            return Err(AppError::AlreadyExists(format!(
                "Attempt with id '{}' already exists",
                attempt.id
            )));
        }
        self.working
            .attempts
            .insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn find_attempt(&mut self, id: &str) -> AppResult<Option<ExamAttempt>> {
        Ok(self.working.attempts.get(id).cloned())
    }

    async fn replace_attempt(&mut self, attempt: &ExamAttempt) -> AppResult<()> {
        match self.working.attempts.get_mut(&attempt.id) {
            Some(existing) => {
                *existing = attempt.clone();
                Ok(())
            }
            None => Err(attempt_not_found(&attempt.id)),
        }
    }

    async fn count_counted_attempts(&mut self, user_id: &str, exam_id: &str) -> AppResult<u64> {
        Ok(self
            .working
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.exam_id == exam_id && !a.is_dropped())
            .count() as u64)
    }

    async fn count_exam_attempts(
        &mut self,
        exam_id: &str,
        statuses: &[AttemptStatus],
    ) -> AppResult<u64> {
        Ok(self
            .working
            .attempts
            .values()
            .filter(|a| a.exam_id == exam_id)
            .filter(|a| statuses.is_empty() || statuses.contains(&a.status))
            .count() as u64)
    }

    async fn list_exam_attempts(&mut self, exam_id: &str) -> AppResult<Vec<ExamAttempt>> {
        Ok(self
            .working
            .attempts
            .values()
            .filter(|a| a.exam_id == exam_id && !a.is_dropped())
            .cloned()
            .collect())
    }

    async fn list_user_attempts(&mut self, user_id: &str) -> AppResult<Vec<ExamAttempt>> {
        let mut attempts: Vec<ExamAttempt> = self
            .working
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && !a.is_dropped())
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(attempts)
    }

    async fn list_attempts(&mut self, offset: i64, limit: i64) -> AppResult<(Vec<ExamAttempt>, i64)> {
        let mut attempts: Vec<ExamAttempt> = self
            .working
            .attempts
            .values()
            .filter(|a| !a.is_dropped())
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(a.id.cmp(&b.id)));

        let total = attempts.len() as i64;
        Ok((page(attempts, offset, limit), total))
    }

    async fn list_expired_attempts(&mut self, now: DateTime<Utc>) -> AppResult<Vec<ExamAttempt>> {
        Ok(self
            .working
            .attempts
            .values()
            .filter(|a| a.status == AttemptStatus::InProgress && a.is_expired(now))
            .cloned()
            .collect())
    }

    async fn claim_attempt_slot(&mut self, user_id: &str, exam_id: &str) -> AppResult<()> {
        *self
            .working
            .attempt_slots
            .entry((user_id.to_string(), exam_id.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }
}

pub async fn ensure_indexes(db: &Database) -> AppResult<()> {
    let attempts = db.get_collection::<ExamAttempt>(ATTEMPTS);
    let models = vec![
        IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "user_id": 1, "exam_id": 1 })
            .build(),
        IndexModel::builder()
            .keys(doc! { "exam_id": 1, "status": 1 })
            .build(),
        IndexModel::builder().keys(doc! { "status": 1 }).build(),
    ];
    attempts.create_indexes(models).await?;

    let slots = db.get_collection::<mongodb::bson::Document>(ATTEMPT_SLOTS);
    slots
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "exam_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    log::info!("ensured indexes on '{}' and '{}'", ATTEMPTS, ATTEMPT_SLOTS);
    Ok(())
}
