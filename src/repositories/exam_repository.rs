use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{IndexOptions, ReplaceOptions},
    IndexModel,
};

use crate::{
    db::{memory::MemoryTransaction, mongo::MongoTransaction, mongo::EXAMS, Database},
    errors::{AppError, AppResult},
    models::domain::Exam,
    repositories::page,
};

/// Listing filter; soft-deleted exams are always excluded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExamFilter {
    pub published: Option<bool>,
    pub created_by: Option<String>,
}

impl ExamFilter {
    fn matches(&self, exam: &Exam) -> bool {
        exam.deleted_at.is_none()
            && self.published.map_or(true, |p| exam.is_published == p)
            && self
                .created_by
                .as_ref()
                .map_or(true, |c| &exam.created_by == c)
    }

    fn to_document(&self) -> Document {
        let mut filter = doc! { "deleted_at": Bson::Null };
        if let Some(published) = self.published {
            filter.insert("is_published", published);
        }
        if let Some(created_by) = &self.created_by {
            filter.insert("created_by", created_by.as_str());
        }
        filter
    }
}

#[async_trait]
pub trait ExamRepository: Send {
    async fn insert_exam(&mut self, exam: &Exam) -> AppResult<()>;
    /// Soft-deleted exams are not returned.
    async fn find_exam(&mut self, id: &str) -> AppResult<Option<Exam>>;
    async fn replace_exam(&mut self, exam: &Exam) -> AppResult<()>;
    async fn list_exams(
        &mut self,
        filter: &ExamFilter,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Exam>, i64)>;
}

#[async_trait]
impl ExamRepository for MongoTransaction {
    async fn insert_exam(&mut self, exam: &Exam) -> AppResult<()> {
        self.exams.insert_one(exam).session(&mut self.session).await?;
        Ok(())
    }

    async fn find_exam(&mut self, id: &str) -> AppResult<Option<Exam>> {
        let exam = self
            .exams
            .find_one(doc! { "id": id, "deleted_at": Bson::Null })
            .session(&mut self.session)
            .await?;
        Ok(exam)
    }

    async fn replace_exam(&mut self, exam: &Exam) -> AppResult<()> {
        let options = ReplaceOptions::builder().upsert(false).build();
        let result = self
            .exams
            .replace_one(doc! { "id": &exam.id }, exam)
            .with_options(options)
            .session(&mut self.session)
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!(
                "Exam with id '{}' not found",
                exam.id
            )));
        }
        Ok(())
    }

    async fn list_exams(
        &mut self,
        filter: &ExamFilter,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Exam>, i64)> {
        let filter = filter.to_document();
        let total = self
            .exams
            .count_documents(filter.clone())
            .session(&mut self.session)
            .await? as i64;

        let mut cursor = self
            .exams
            .find(filter)
            .skip(offset.max(0) as u64)
            .limit(limit)
            .sort(doc! { "created_at": -1 })
            .session(&mut self.session)
            .await?;
        let exams: Vec<Exam> = cursor.stream(&mut self.session).try_collect().await?;

        Ok((exams, total))
    }
}

#[async_trait]
impl ExamRepository for MemoryTransaction {
    async fn insert_exam(&mut self, exam: &Exam) -> AppResult<()> {
        if self.working.exams.contains_key(&exam.id) {
            return Err(AppError::AlreadyExists(format!(
                "Exam with id '{}' already exists",
                exam.id
            )));
        }
        self.working.exams.insert(exam.id.clone(), exam.clone());
        Ok(())
    }

    async fn find_exam(&mut self, id: &str) -> AppResult<Option<Exam>> {
        Ok(self
            .working
            .exams
            .get(id)
            .filter(|e| e.deleted_at.is_none())
            .cloned())
    }

    async fn replace_exam(&mut self, exam: &Exam) -> AppResult<()> {
        match self.working.exams.get_mut(&exam.id) {
            Some(existing) => {
                *existing = exam.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Exam with id '{}' not found",
                exam.id
            ))),
        }
    }

    async fn list_exams(
        &mut self,
        filter: &ExamFilter,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Exam>, i64)> {
        let mut items: Vec<Exam> = self
            .working
            .exams
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = items.len() as i64;
        Ok((page(items, offset, limit), total))
    }
}

pub async fn ensure_indexes(db: &Database) -> AppResult<()> {
    let exams = db.get_collection::<Exam>(EXAMS);

    let models = vec![
        IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "is_published": 1, "start_time": 1, "end_time": 1 })
            .build(),
        IndexModel::builder().keys(doc! { "created_by": 1 }).build(),
    ];
    exams.create_indexes(models).await?;

    log::info!("ensured indexes on '{}'", EXAMS);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::exam::test_settings;
    use chrono::Utc;

    #[test]
    fn filter_excludes_soft_deleted_exams() {
        let mut exam = Exam::new_draft(test_settings("History"), "author");
        let filter = ExamFilter::default();
        assert!(filter.matches(&exam));

        exam.deleted_at = Some(Utc::now());
        assert!(!filter.matches(&exam));
    }

    #[test]
    fn filter_document_carries_optional_fields() {
        let filter = ExamFilter {
            published: Some(true),
            created_by: Some("author".into()),
        };
        let document = filter.to_document();
        assert_eq!(document.get_bool("is_published").unwrap(), true);
        assert_eq!(document.get_str("created_by").unwrap(), "author");
        assert_eq!(document.get("deleted_at"), Some(&Bson::Null));
    }
}
