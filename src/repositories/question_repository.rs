use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{IndexOptions, ReplaceOptions},
    IndexModel,
};

use crate::{
    db::{memory::MemoryTransaction, mongo::MongoTransaction, mongo::QUESTIONS, Database},
    errors::{AppError, AppResult},
    models::domain::Question,
};

#[async_trait]
pub trait QuestionRepository: Send {
    async fn insert_question(&mut self, question: &Question) -> AppResult<()>;
    async fn find_question(&mut self, id: &str) -> AppResult<Option<Question>>;
    async fn replace_question(&mut self, question: &Question) -> AppResult<()>;
    async fn delete_question(&mut self, id: &str) -> AppResult<()>;
    /// Questions of an exam ordered by position.
    async fn list_questions(&mut self, exam_id: &str) -> AppResult<Vec<Question>>;
    /// Moves every question positioned after `order` one slot up.
    async fn close_order_gap(&mut self, exam_id: &str, order: i32) -> AppResult<u64>;
    async fn delete_questions_for_exam(&mut self, exam_id: &str) -> AppResult<u64>;
}

fn question_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Question with id '{}' not found", id))
}

#[async_trait]
impl QuestionRepository for MongoTransaction {
    async fn insert_question(&mut self, question: &Question) -> AppResult<()> {
        self.questions
            .insert_one(question)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn find_question(&mut self, id: &str) -> AppResult<Option<Question>> {
        let question = self
            .questions
            .find_one(doc! { "id": id })
            .session(&mut self.session)
            .await?;
        Ok(question)
    }

    async fn replace_question(&mut self, question: &Question) -> AppResult<()> {
        let options = ReplaceOptions::builder().upsert(false).build();
        let result = self
            .questions
            .replace_one(doc! { "id": &question.id }, question)
            .with_options(options)
            .session(&mut self.session)
            .await?;

        if result.matched_count == 0 {
            return Err(question_not_found(&question.id));
        }
        Ok(())
    }

    async fn delete_question(&mut self, id: &str) -> AppResult<()> {
        let result = self
            .questions
            .delete_one(doc! { "id": id })
            .session(&mut self.session)
            .await?;

        if result.deleted_count == 0 {
            return Err(question_not_found(id));
        }
        Ok(())
    }

    async fn list_questions(&mut self, exam_id: &str) -> AppResult<Vec<Question>> {
        let mut cursor = self
            .questions
            .find(doc! { "exam_id": exam_id })
            .sort(doc! { "order": 1 })
            .session(&mut self.session)
            .await?;
        let questions: Vec<Question> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(questions)
    }

    async fn close_order_gap(&mut self, exam_id: &str, order: i32) -> AppResult<u64> {
        let result = self
            .questions
            .update_many(
                doc! { "exam_id": exam_id, "order": { "$gt": order } },
                doc! { "$inc": { "order": -1 } },
            )
            .session(&mut self.session)
            .await?;
        Ok(result.modified_count)
    }

    async fn delete_questions_for_exam(&mut self, exam_id: &str) -> AppResult<u64> {
        let result = self
            .questions
            .delete_many(doc! { "exam_id": exam_id })
            .session(&mut self.session)
            .await?;
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl QuestionRepository for MemoryTransaction {
    async fn insert_question(&mut self, question: &Question) -> AppResult<()> {
        if self.working.questions.contains_key(&question.id) {
            return Err(AppError::AlreadyExists(format!(
                "Question with id '{}' already exists",
                question.id
            )));
        }
        self.working
            .questions
            .insert(question.id.clone(), question.clone());
        Ok(())
    }

    async fn find_question(&mut self, id: &str) -> AppResult<Option<Question>> {
        Ok(self.working.questions.get(id).cloned())
    }

    async fn replace_question(&mut self, question: &Question) -> AppResult<()> {
        match self.working.questions.get_mut(&question.id) {
            Some(existing) => {
                *existing = question.clone();
                Ok(())
            }
            None => Err(question_not_found(&question.id)),
        }
    }

    async fn delete_question(&mut self, id: &str) -> AppResult<()> {
        self.working
            .questions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| question_not_found(id))
    }

    async fn list_questions(&mut self, exam_id: &str) -> AppResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .working
            .questions
            .values()
            .filter(|q| q.exam_id == exam_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }

    async fn close_order_gap(&mut self, exam_id: &str, order: i32) -> AppResult<u64> {
        let mut moved = 0;
        for question in self.working.questions.values_mut() {
            if question.exam_id == exam_id && question.order > order {
                question.order -= 1;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn delete_questions_for_exam(&mut self, exam_id: &str) -> AppResult<u64> {
        let before = self.working.questions.len();
        self.working.questions.retain(|_, q| q.exam_id != exam_id);
        Ok((before - self.working.questions.len()) as u64)
    }
}

pub async fn ensure_indexes(db: &Database) -> AppResult<()> {
    let questions = db.get_collection::<Question>(QUESTIONS);

    let models = vec![
        IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "exam_id": 1, "order": 1 })
            .build(),
    ];
    questions.create_indexes(models).await?;

    log::info!("ensured indexes on '{}'", QUESTIONS);
    Ok(())
}
