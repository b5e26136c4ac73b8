use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{IndexOptions, ReplaceOptions},
    IndexModel,
};

use crate::{
    db::{memory::MemoryTransaction, mongo::MongoTransaction, mongo::ANSWERS, Database},
    errors::{AppError, AppResult},
    models::domain::Answer,
};

#[async_trait]
pub trait AnswerRepository: Send {
    async fn find_answer(&mut self, id: &str) -> AppResult<Option<Answer>>;
    async fn find_answer_for(
        &mut self,
        attempt_id: &str,
        question_id: &str,
    ) -> AppResult<Option<Answer>>;
    /// Inserts or replaces by id; at most one answer exists per (question, attempt).
    async fn save_answer(&mut self, answer: &Answer) -> AppResult<()>;
    async fn list_attempt_answers(&mut self, attempt_id: &str) -> AppResult<Vec<Answer>>;
    async fn count_question_answers(&mut self, question_id: &str) -> AppResult<u64>;
}

#[async_trait]
impl AnswerRepository for MongoTransaction {
    async fn find_answer(&mut self, id: &str) -> AppResult<Option<Answer>> {
        let answer = self
            .answers
            .find_one(doc! { "id": id })
            .session(&mut self.session)
            .await?;
        Ok(answer)
    }

    async fn find_answer_for(
        &mut self,
        attempt_id: &str,
        question_id: &str,
    ) -> AppResult<Option<Answer>> {
        let answer = self
            .answers
            .find_one(doc! { "attempt_id": attempt_id, "question_id": question_id })
            .session(&mut self.session)
            .await?;
        Ok(answer)
    }

    async fn save_answer(&mut self, answer: &Answer) -> AppResult<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.answers
            .replace_one(doc! { "id": &answer.id }, answer)
            .with_options(options)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn list_attempt_answers(&mut self, attempt_id: &str) -> AppResult<Vec<Answer>> {
        let mut cursor = self
            .answers
            .find(doc! { "attempt_id": attempt_id })
            .session(&mut self.session)
            .await?;
        let answers: Vec<Answer> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(answers)
    }

    async fn count_question_answers(&mut self, question_id: &str) -> AppResult<u64> {
        let count = self
            .answers
            .count_documents(doc! { "question_id": question_id })
            .session(&mut self.session)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AnswerRepository for MemoryTransaction {
    async fn find_answer(&mut self, id: &str) -> AppResult<Option<Answer>> {
        Ok(self.working.answers.get(id).cloned())
    }

    async fn find_answer_for(
        &mut self,
        attempt_id: &str,
        question_id: &str,
    ) -> AppResult<Option<Answer>> {
        Ok(self
            .working
            .answers
            .values()
            .find(|a| a.attempt_id == attempt_id && a.question_id == question_id)
            .cloned())
    }

    async fn save_answer(&mut self, answer: &Answer) -> AppResult<()> {
        let duplicate = self.working.answers.values().any(|a| {
            a.id != answer.id
                && a.attempt_id == answer.attempt_id
                && a.question_id == answer.question_id
        });
        if duplicate {
            return Err(AppError::AlreadyExists(format!(
                "Question '{}' is already answered in attempt '{}'",
                answer.question_id, answer.attempt_id
            )));
        }
        self.working
            .answers
            .insert(answer.id.clone(), answer.clone());
        Ok(())
    }

    async fn list_attempt_answers(&mut self, attempt_id: &str) -> AppResult<Vec<Answer>> {
        Ok(self
            .working
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn count_question_answers(&mut self, question_id: &str) -> AppResult<u64> {
        Ok(self
            .working
            .answers
            .values()
            .filter(|a| a.question_id == question_id)
            .count() as u64)
    }
}

pub async fn ensure_indexes(db: &Database) -> AppResult<()> {
    let answers = db.get_collection::<Answer>(ANSWERS);
    let unique = IndexOptions::builder().unique(true).build();

    let models = vec![
        IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(unique.clone())
            .build(),
        IndexModel::builder()
            .keys(doc! { "question_id": 1, "attempt_id": 1 })
            .options(unique)
            .build(),
        IndexModel::builder().keys(doc! { "attempt_id": 1 }).build(),
    ];
    answers.create_indexes(models).await?;

    log::info!("ensured indexes on '{}'", ANSWERS);
    Ok(())
}
