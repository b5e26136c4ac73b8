use std::sync::Arc;

use chrono::Utc;

use crate::{
    db::{finish, Store, Transaction},
    errors::{AppError, AppResult},
    models::{
        domain::{
            exam::{PublishAction, PublishEvent},
            AttemptStatus, Exam, ExamSettings, Question, QuestionDraft,
        },
        dto::{request::PaginationParams, response::ExamStatistics},
    },
    repositories::ExamFilter,
    services::file_store::FileStore,
};

const COPY_PREFIX: &str = "Copy of ";

pub(crate) async fn load_exam(tx: &mut dyn Transaction, exam_id: &str) -> AppResult<Exam> {
    tx.find_exam(exam_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Exam with id '{}' not found", exam_id)))
}

pub(crate) async fn load_question(tx: &mut dyn Transaction, question_id: &str) -> AppResult<Question> {
    tx.find_question(question_id).await?.ok_or_else(|| {
        AppError::NotFound(format!("Question with id '{}' not found", question_id))
    })
}

fn ensure_draft(exam: &Exam) -> AppResult<()> {
    if exam.is_published {
        return Err(AppError::ExamPublished(exam.id.clone()));
    }
    Ok(())
}

/// Rewrites the cached count and marks from the stored questions.
async fn recompute_totals(tx: &mut dyn Transaction, exam: &mut Exam) -> AppResult<Vec<Question>> {
    let questions = tx.list_questions(&exam.id).await?;
    exam.question_count = questions.len() as i32;
    exam.total_marks = questions.iter().map(|q| q.marks).sum();
    Ok(questions)
}

/// Authoring of exams and their questions.
pub struct CatalogService {
    store: Arc<dyn Store>,
    files: Arc<dyn FileStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, files: Arc<dyn FileStore>) -> Self {
        Self { store, files }
    }

    pub async fn create_exam(&self, settings: ExamSettings, creator: &str) -> AppResult<Exam> {
        settings.validate()?;
        let mut exam = Exam::new_draft(settings, creator);
        exam.log("created", creator, format!("Exam '{}' created", exam.title));

        let mut tx = self.store.begin().await?;
        let outcome = tx.insert_exam(&exam).await;
        finish(tx, outcome).await?;

        log::info!("exam '{}' created by '{}'", exam.id, creator);
        Ok(exam)
    }

    pub async fn update_exam(
        &self,
        exam_id: &str,
        settings: ExamSettings,
        editor: &str,
    ) -> AppResult<Exam> {
        settings.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::update_exam_in(tx.as_mut(), exam_id, settings, editor).await;
        finish(tx, outcome).await
    }

    async fn update_exam_in(
        tx: &mut dyn Transaction,
        exam_id: &str,
        settings: ExamSettings,
        editor: &str,
    ) -> AppResult<Exam> {
        let mut exam = load_exam(tx, exam_id).await?;

        let active = tx
            .count_exam_attempts(exam_id, &[AttemptStatus::InProgress, AttemptStatus::Submitted])
            .await?;
        if active > 0 {
            return Err(AppError::ActiveAttempts(exam_id.to_string()));
        }

        recompute_totals(tx, &mut exam).await?;
        if exam.question_count > 0 && settings.passing_marks > exam.total_marks {
            return Err(AppError::ValidationError(format!(
                "Passing marks ({}) cannot be greater than total marks ({})",
                settings.passing_marks, exam.total_marks
            )));
        }

        let changes = describe_changes(&exam.settings(), &settings);
        exam.apply_settings(settings);
        exam.log("updated", editor, changes);
        tx.replace_exam(&exam).await?;
        Ok(exam)
    }

    pub async fn add_question(
        &self,
        exam_id: &str,
        draft: QuestionDraft,
        author: &str,
    ) -> AppResult<Question> {
        draft.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::add_question_in(tx.as_mut(), exam_id, draft, author).await;
        finish(tx, outcome).await
    }

    async fn add_question_in(
        tx: &mut dyn Transaction,
        exam_id: &str,
        draft: QuestionDraft,
        author: &str,
    ) -> AppResult<Question> {
        let mut exam = load_exam(tx, exam_id).await?;
        ensure_draft(&exam)?;

        let order = tx.list_questions(exam_id).await?.len() as i32 + 1;
        let question = Question::from_draft(draft, exam_id, order, author);
        tx.insert_question(&question).await?;

        recompute_totals(tx, &mut exam).await?;
        exam.log(
            "question_added",
            author,
            format!(
                "Question {} added with {} marks; total is now {}",
                question.order, question.marks, exam.total_marks
            ),
        );
        tx.replace_exam(&exam).await?;
        Ok(question)
    }

    pub async fn update_question(
        &self,
        question_id: &str,
        draft: QuestionDraft,
        editor: &str,
    ) -> AppResult<Question> {
        draft.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::update_question_in(tx.as_mut(), question_id, draft, editor).await;
        finish(tx, outcome).await
    }

    async fn update_question_in(
        tx: &mut dyn Transaction,
        question_id: &str,
        draft: QuestionDraft,
        editor: &str,
    ) -> AppResult<Question> {
        let mut question = load_question(tx, question_id).await?;
        let mut exam = load_exam(tx, &question.exam_id).await?;
        ensure_draft(&exam)?;

        // Recorded answers were graded against the current marks and key.
        if tx.count_question_answers(question_id).await? > 0 {
            return Err(AppError::QuestionHasAnswers(question_id.to_string()));
        }

        let previous_marks = question.marks;
        question.apply_draft(draft);
        tx.replace_question(&question).await?;

        recompute_totals(tx, &mut exam).await?;
        exam.log(
            "question_updated",
            editor,
            format!(
                "Question {} marks changed by {:+}; total is now {}",
                question.order,
                question.marks - previous_marks,
                exam.total_marks
            ),
        );
        tx.replace_exam(&exam).await?;
        Ok(question)
    }

    pub async fn delete_question(&self, question_id: &str, editor: &str) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::delete_question_in(tx.as_mut(), question_id, editor).await;
        let removed = finish(tx, outcome).await?;

        if let Some(url) = removed.image_url {
            self.delete_image_best_effort(&url).await;
        }
        Ok(())
    }

    async fn delete_question_in(
        tx: &mut dyn Transaction,
        question_id: &str,
        editor: &str,
    ) -> AppResult<Question> {
        let question = load_question(tx, question_id).await?;
        let mut exam = load_exam(tx, &question.exam_id).await?;
        ensure_draft(&exam)?;

        if tx.count_question_answers(question_id).await? > 0 {
            return Err(AppError::QuestionHasAnswers(question_id.to_string()));
        }

        tx.delete_question(question_id).await?;
        tx.close_order_gap(&exam.id, question.order).await?;

        recompute_totals(tx, &mut exam).await?;
        exam.log(
            "question_deleted",
            editor,
            format!(
                "Question {} removed ({} marks); total is now {}",
                question.order, question.marks, exam.total_marks
            ),
        );
        tx.replace_exam(&exam).await?;
        Ok(question)
    }

    /// Uploads a new image for the question and deletes the one it replaces.
    pub async fn set_question_image(
        &self,
        question_id: &str,
        bytes: Vec<u8>,
        file_name: &str,
        editor: &str,
    ) -> AppResult<Question> {
        {
            let mut tx = self.store.begin().await?;
            let outcome = Self::check_editable(tx.as_mut(), question_id).await;
            finish(tx, outcome).await?;
        }

        let url = self.files.upload(bytes, file_name).await?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::attach_image_in(tx.as_mut(), question_id, &url, editor).await;
        let (question, previous) = match finish(tx, outcome).await {
            Ok(result) => result,
            Err(e) => {
                self.delete_image_best_effort(&url).await;
                return Err(e);
            }
        };

        if let Some(previous) = previous {
            self.delete_image_best_effort(&previous).await;
        }
        Ok(question)
    }

    async fn check_editable(tx: &mut dyn Transaction, question_id: &str) -> AppResult<()> {
        let question = load_question(tx, question_id).await?;
        let exam = load_exam(tx, &question.exam_id).await?;
        ensure_draft(&exam)
    }

    async fn attach_image_in(
        tx: &mut dyn Transaction,
        question_id: &str,
        url: &str,
        editor: &str,
    ) -> AppResult<(Question, Option<String>)> {
        let mut question = load_question(tx, question_id).await?;
        let mut exam = load_exam(tx, &question.exam_id).await?;
        ensure_draft(&exam)?;

        let previous = question.image_url.replace(url.to_string());
        question.modified_at = Some(Utc::now());
        tx.replace_question(&question).await?;

        exam.log(
            "question_image_updated",
            editor,
            format!("Question {} image replaced", question.order),
        );
        tx.replace_exam(&exam).await?;
        Ok((question, previous))
    }

    async fn delete_image_best_effort(&self, url: &str) {
        if let Err(e) = self.files.delete(url).await {
            log::warn!("failed to delete image '{}': {}", url, e);
        }
    }

    pub async fn publish(&self, exam_id: &str, publisher: &str) -> AppResult<Exam> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::publish_in(tx.as_mut(), exam_id, publisher).await;
        let exam = finish(tx, outcome).await?;

        log::info!("exam '{}' published by '{}'", exam.id, publisher);
        Ok(exam)
    }

    async fn publish_in(tx: &mut dyn Transaction, exam_id: &str, publisher: &str) -> AppResult<Exam> {
        let mut exam = load_exam(tx, exam_id).await?;
        ensure_draft(&exam)?;

        recompute_totals(tx, &mut exam).await?;
        exam.check_publishable()?;

        let now = Utc::now();
        exam.is_published = true;
        exam.published_at = Some(now);
        exam.publish_history.push(PublishEvent {
            action: PublishAction::Publish,
            by: publisher.to_string(),
            at: now,
            reason: None,
        });
        exam.log("published", publisher, "Exam published".to_string());
        tx.replace_exam(&exam).await?;
        Ok(exam)
    }

    pub async fn unpublish(
        &self,
        exam_id: &str,
        reason: Option<String>,
        editor: &str,
    ) -> AppResult<Exam> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::unpublish_in(tx.as_mut(), exam_id, reason, editor).await;
        let exam = finish(tx, outcome).await?;

        log::info!("exam '{}' unpublished by '{}'", exam.id, editor);
        Ok(exam)
    }

    async fn unpublish_in(
        tx: &mut dyn Transaction,
        exam_id: &str,
        reason: Option<String>,
        editor: &str,
    ) -> AppResult<Exam> {
        let mut exam = load_exam(tx, exam_id).await?;
        if !exam.is_published {
            return Err(AppError::ValidationError(format!(
                "Exam '{}' is not published",
                exam_id
            )));
        }

        let in_progress = tx
            .count_exam_attempts(exam_id, &[AttemptStatus::InProgress])
            .await?;
        if in_progress > 0 {
            return Err(AppError::ActiveAttempts(exam_id.to_string()));
        }

        let now = Utc::now();
        exam.is_published = false;
        exam.unpublished_at = Some(now);
        exam.publish_history.push(PublishEvent {
            action: PublishAction::Unpublish,
            by: editor.to_string(),
            at: now,
            reason: reason.clone(),
        });
        exam.log(
            "unpublished",
            editor,
            reason.unwrap_or_else(|| "Exam unpublished".to_string()),
        );
        tx.replace_exam(&exam).await?;
        Ok(exam)
    }

    /// Copies the exam and all of its questions into a new draft.
    pub async fn duplicate(&self, exam_id: &str, creator: &str) -> AppResult<Exam> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::duplicate_in(tx.as_mut(), exam_id, creator).await;
        let copy = finish(tx, outcome).await?;

        log::info!("exam '{}' duplicated into '{}'", exam_id, copy.id);
        Ok(copy)
    }

    async fn duplicate_in(tx: &mut dyn Transaction, exam_id: &str, creator: &str) -> AppResult<Exam> {
        let source = load_exam(tx, exam_id).await?;
        let questions = tx.list_questions(exam_id).await?;

        let mut settings = source.settings();
        settings.title = format!("{}{}", COPY_PREFIX, source.title);
        let mut copy = Exam::new_draft(settings, creator);
        tx.insert_exam(&copy).await?;

        for question in &questions {
            let mut duplicate = question.duplicate_into(&copy.id, creator);
            // Images stay owned by the source question.
            duplicate.image_url = None;
            tx.insert_question(&duplicate).await?;
        }

        recompute_totals(tx, &mut copy).await?;
        copy.log(
            "duplicated",
            creator,
            format!("Copied from exam '{}' with {} questions", source.id, questions.len()),
        );
        tx.replace_exam(&copy).await?;
        Ok(copy)
    }

    /// Deletes the questions and soft-deletes the exam together.
    pub async fn delete_exam(&self, exam_id: &str, editor: &str) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::delete_exam_in(tx.as_mut(), exam_id, editor).await;
        let removed = finish(tx, outcome).await?;

        for url in removed.into_iter().filter_map(|q| q.image_url) {
            self.delete_image_best_effort(&url).await;
        }
        log::info!("exam '{}' deleted by '{}'", exam_id, editor);
        Ok(())
    }

    async fn delete_exam_in(
        tx: &mut dyn Transaction,
        exam_id: &str,
        editor: &str,
    ) -> AppResult<Vec<Question>> {
        let mut exam = load_exam(tx, exam_id).await?;
        ensure_draft(&exam)?;

        if tx.count_exam_attempts(exam_id, &[]).await? > 0 {
            return Err(AppError::ExamHasAttempts(exam_id.to_string()));
        }

        let questions = tx.list_questions(exam_id).await?;
        tx.delete_questions_for_exam(exam_id).await?;

        exam.question_count = 0;
        exam.total_marks = 0.0;
        exam.deleted_at = Some(Utc::now());
        exam.deleted_by = Some(editor.to_string());
        exam.log(
            "deleted",
            editor,
            format!("Exam deleted with {} questions", questions.len()),
        );
        tx.replace_exam(&exam).await?;
        Ok(questions)
    }

    /// Recomputes the cached totals and reports whether they had drifted.
    pub async fn reconcile_totals(&self, exam_id: &str) -> AppResult<(Exam, bool)> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::reconcile_in(tx.as_mut(), exam_id).await;
        finish(tx, outcome).await
    }

    async fn reconcile_in(tx: &mut dyn Transaction, exam_id: &str) -> AppResult<(Exam, bool)> {
        let mut exam = load_exam(tx, exam_id).await?;
        let (cached_count, cached_marks) = (exam.question_count, exam.total_marks);

        recompute_totals(tx, &mut exam).await?;
        let drifted = cached_count != exam.question_count
            || (cached_marks - exam.total_marks).abs() > f64::EPSILON;
        if drifted {
            log::warn!(
                "exam '{}' totals drifted: {} questions/{} marks cached, {}/{} actual",
                exam_id,
                cached_count,
                cached_marks,
                exam.question_count,
                exam.total_marks
            );
            exam.touch();
            tx.replace_exam(&exam).await?;
        }
        Ok((exam, drifted))
    }

    pub async fn list_exams(
        &self,
        filter: ExamFilter,
        pagination: &PaginationParams,
    ) -> AppResult<(Vec<Exam>, i64)> {
        let mut tx = self.store.begin().await?;
        let outcome = tx
            .list_exams(&filter, pagination.offset(), pagination.limit())
            .await;
        finish(tx, outcome).await
    }

    pub async fn get_exam(&self, exam_id: &str) -> AppResult<Exam> {
        let mut tx = self.store.begin().await?;
        let outcome = load_exam(tx.as_mut(), exam_id).await;
        finish(tx, outcome).await
    }

    pub async fn get_question(&self, question_id: &str) -> AppResult<Question> {
        let mut tx = self.store.begin().await?;
        let outcome = load_question(tx.as_mut(), question_id).await;
        finish(tx, outcome).await
    }

    pub async fn list_questions(&self, exam_id: &str) -> AppResult<Vec<Question>> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::list_questions_in(tx.as_mut(), exam_id).await;
        finish(tx, outcome).await
    }

    async fn list_questions_in(tx: &mut dyn Transaction, exam_id: &str) -> AppResult<Vec<Question>> {
        load_exam(tx, exam_id).await?;
        tx.list_questions(exam_id).await
    }

    pub async fn exam_statistics(&self, exam_id: &str) -> AppResult<ExamStatistics> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::statistics_in(tx.as_mut(), exam_id).await;
        finish(tx, outcome).await
    }

    async fn statistics_in(tx: &mut dyn Transaction, exam_id: &str) -> AppResult<ExamStatistics> {
        let exam = load_exam(tx, exam_id).await?;
        let attempts = tx.list_exam_attempts(exam_id).await?;
        let questions = tx.list_questions(exam_id).await?;
        Ok(ExamStatistics::compute(
            exam_id,
            exam.passing_marks,
            &attempts,
            &questions,
        ))
    }
}

fn describe_changes(before: &ExamSettings, after: &ExamSettings) -> String {
    let mut changed = Vec::new();
    if before.title != after.title.trim() {
        changed.push("title");
    }
    if before.description != after.description {
        changed.push("description");
    }
    if before.instructions != after.instructions {
        changed.push("instructions");
    }
    if before.duration_minutes != after.duration_minutes {
        changed.push("duration");
    }
    if before.passing_marks != after.passing_marks {
        changed.push("passing marks");
    }
    if before.start_time != after.start_time || before.end_time != after.end_time {
        changed.push("schedule");
    }
    if before.shuffle_questions != after.shuffle_questions || before.show_result != after.show_result {
        changed.push("display options");
    }
    if before.price != after.price {
        changed.push("price");
    }
    if before.attempts != after.attempts {
        changed.push("attempts");
    }

    if changed.is_empty() {
        "No changes".to_string()
    } else {
        format!("Changed {}", changed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::domain::{
        exam::test_settings,
        question::{mcq_draft, QuestionKind},
        Answer, AnswerValue, ClientInfo, ExamAttempt,
    };
    use crate::services::file_store::MockFileStore;

    fn service_with(files: MockFileStore) -> (CatalogService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CatalogService::new(store.clone(), Arc::new(files)), store)
    }

    fn service() -> (CatalogService, Arc<MemoryStore>) {
        service_with(MockFileStore::new())
    }

    fn true_false(marks: f64) -> QuestionDraft {
        QuestionDraft {
            text: "The sky is blue".to_string(),
            kind: QuestionKind::TrueFalse {
                correct_answer: true,
            },
            marks,
            negative_marks: 0.0,
            explanation: None,
            difficulty: Default::default(),
        }
    }

    async fn exam_with_questions(service: &CatalogService, marks: &[f64]) -> (Exam, Vec<Question>) {
        let exam = service
            .create_exam(test_settings("Algebra"), "author")
            .await
            .unwrap();
        let mut questions = Vec::new();
        for &m in marks {
            questions.push(service.add_question(&exam.id, true_false(m), "author").await.unwrap());
        }
        (service.get_exam(&exam.id).await.unwrap(), questions)
    }

    async fn insert_attempt(store: &MemoryStore, exam: &Exam, status: AttemptStatus) -> ExamAttempt {
        let mut attempt = ExamAttempt::begin("student", exam, ClientInfo::default(), Utc::now());
        attempt.status = status;
        let mut tx = store.begin().await.unwrap();
        tx.insert_attempt(&attempt).await.unwrap();
        tx.commit().await.unwrap();
        attempt
    }

    #[tokio::test]
    async fn totals_follow_question_changes() {
        let (service, _) = service();
        let (exam, questions) = exam_with_questions(&service, &[10.0, 20.0, 30.0]).await;
        assert_eq!(exam.question_count, 3);
        assert_eq!(exam.total_marks, 60.0);
        assert_eq!(
            questions.iter().map(|q| q.order).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        service
            .update_question(&questions[0].id, true_false(15.0), "author")
            .await
            .unwrap();
        service.delete_question(&questions[1].id, "author").await.unwrap();

        let exam = service.get_exam(&exam.id).await.unwrap();
        assert_eq!(exam.question_count, 2);
        assert_eq!(exam.total_marks, 45.0);

        let remaining = service.list_questions(&exam.id).await.unwrap();
        assert_eq!(
            remaining.iter().map(|q| q.order).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(exam.update_log.iter().any(|e| e.action == "question_deleted"));
    }

    #[tokio::test]
    async fn publish_requires_valid_totals() {
        let (service, _) = service();
        let exam = service
            .create_exam(test_settings("Empty"), "author")
            .await
            .unwrap();

        assert!(service.publish(&exam.id, "author").await.is_err());
        let exam = service.get_exam(&exam.id).await.unwrap();
        assert!(!exam.is_published);
        assert!(exam.published_at.is_none());

        // passing marks 40 exceed the 30 available
        service.add_question(&exam.id, true_false(30.0), "author").await.unwrap();
        assert!(matches!(
            service.publish(&exam.id, "author").await,
            Err(AppError::ValidationError(_))
        ));

        service.add_question(&exam.id, true_false(30.0), "author").await.unwrap();
        let published = service.publish(&exam.id, "author").await.unwrap();
        assert!(published.is_published);
        assert!(published.published_at.is_some());
        assert_eq!(published.publish_history.len(), 1);
    }

    #[tokio::test]
    async fn published_exams_reject_question_edits() {
        let (service, _) = service();
        let (exam, questions) = exam_with_questions(&service, &[50.0]).await;
        service.publish(&exam.id, "author").await.unwrap();

        assert!(matches!(
            service.add_question(&exam.id, true_false(5.0), "author").await,
            Err(AppError::ExamPublished(_))
        ));
        assert!(matches!(
            service.update_question(&questions[0].id, true_false(5.0), "author").await,
            Err(AppError::ExamPublished(_))
        ));
        assert!(matches!(
            service.delete_question(&questions[0].id, "author").await,
            Err(AppError::ExamPublished(_))
        ));
        assert!(matches!(
            service.delete_exam(&exam.id, "author").await,
            Err(AppError::ExamPublished(_))
        ));
    }

    #[tokio::test]
    async fn update_and_unpublish_blocked_by_active_attempts() {
        let (service, store) = service();
        let (exam, _) = exam_with_questions(&service, &[50.0]).await;
        service.publish(&exam.id, "author").await.unwrap();
        insert_attempt(&store, &exam, AttemptStatus::InProgress).await;

        assert!(matches!(
            service.update_exam(&exam.id, test_settings("Renamed"), "author").await,
            Err(AppError::ActiveAttempts(_))
        ));
        assert!(matches!(
            service.unpublish(&exam.id, None, "author").await,
            Err(AppError::ActiveAttempts(_))
        ));
    }

    #[tokio::test]
    async fn answered_questions_cannot_be_deleted() {
        let (service, store) = service();
        let (exam, questions) = exam_with_questions(&service, &[10.0, 10.0]).await;
        let attempt = insert_attempt(&store, &exam, AttemptStatus::Completed).await;

        {
            let mut tx = store.begin().await.unwrap();
            let answer = Answer::graded(
                &attempt.id,
                &questions[0],
                AnswerValue::TrueFalse { value: true },
            );
            tx.save_answer(&answer).await.unwrap();
            tx.commit().await.unwrap();
        }

        assert!(matches!(
            service.delete_question(&questions[0].id, "author").await,
            Err(AppError::QuestionHasAnswers(_))
        ));
        assert_eq!(service.get_exam(&exam.id).await.unwrap().question_count, 2);
    }

    #[tokio::test]
    async fn answered_questions_cannot_be_edited_after_unpublish() {
        let (service, store) = service();
        let (exam, questions) = exam_with_questions(&service, &[50.0]).await;
        service.publish(&exam.id, "author").await.unwrap();
        let attempt = insert_attempt(&store, &exam, AttemptStatus::Submitted).await;
        {
            let mut tx = store.begin().await.unwrap();
            let answer = Answer::graded(
                &attempt.id,
                &questions[0],
                AnswerValue::TrueFalse { value: true },
            );
            tx.save_answer(&answer).await.unwrap();
            tx.commit().await.unwrap();
        }
        service.unpublish(&exam.id, None, "author").await.unwrap();

        assert!(matches!(
            service.update_question(&questions[0].id, true_false(10.0), "author").await,
            Err(AppError::QuestionHasAnswers(_))
        ));
        let exam = service.get_exam(&exam.id).await.unwrap();
        assert_eq!(exam.total_marks, 50.0);
        assert_eq!(service.get_question(&questions[0].id).await.unwrap().marks, 50.0);
    }

    #[tokio::test]
    async fn delete_exam_cascades_to_questions() {
        let (service, store) = service();
        let (exam, _) = exam_with_questions(&service, &[10.0, 10.0]).await;

        service.delete_exam(&exam.id, "author").await.unwrap();

        assert!(matches!(
            service.get_exam(&exam.id).await,
            Err(AppError::NotFound(_))
        ));
        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_questions(&exam.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exams_with_attempts_cannot_be_deleted() {
        let (service, store) = service();
        let (exam, _) = exam_with_questions(&service, &[10.0]).await;
        insert_attempt(&store, &exam, AttemptStatus::Completed).await;

        assert!(matches!(
            service.delete_exam(&exam.id, "author").await,
            Err(AppError::ExamHasAttempts(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_copies_questions_into_a_draft() {
        let (service, _) = service();
        let (exam, _) = exam_with_questions(&service, &[10.0, 35.0]).await;
        service.publish(&exam.id, "author").await.unwrap();

        let copy = service.duplicate(&exam.id, "copier").await.unwrap();
        assert_eq!(copy.title, "Copy of Algebra");
        assert!(!copy.is_published);
        assert_eq!(copy.question_count, 2);
        assert_eq!(copy.total_marks, 45.0);
        assert_eq!(copy.created_by, "copier");

        let copied = service.list_questions(&copy.id).await.unwrap();
        assert!(copied.iter().all(|q| q.exam_id == copy.id));
    }

    #[tokio::test]
    async fn reconcile_repairs_drifted_totals() {
        let (service, store) = service();
        let (mut exam, _) = exam_with_questions(&service, &[10.0, 20.0]).await;

        exam.total_marks = 999.0;
        {
            let mut tx = store.begin().await.unwrap();
            tx.replace_exam(&exam).await.unwrap();
            tx.commit().await.unwrap();
        }

        let (fixed, drifted) = service.reconcile_totals(&exam.id).await.unwrap();
        assert!(drifted);
        assert_eq!(fixed.total_marks, 30.0);

        let (_, drifted) = service.reconcile_totals(&exam.id).await.unwrap();
        assert!(!drifted);
    }

    #[tokio::test]
    async fn replacing_an_image_deletes_the_old_one() {
        let mut files = MockFileStore::new();
        let mut uploads = vec!["/uploads/second.png", "/uploads/first.png"];
        files
            .expect_upload()
            .times(2)
            .returning(move |_, _| Ok(uploads.pop().unwrap_or_default().to_string()));
        files
            .expect_delete()
            .withf(|url| url == "/uploads/first.png")
            .times(1)
            .returning(|_| Ok(()));

        let (service, _) = service_with(files);
        let (_, questions) = exam_with_questions(&service, &[10.0]).await;

        let first = service
            .set_question_image(&questions[0].id, vec![1], "a.png", "author")
            .await
            .unwrap();
        assert_eq!(first.image_url.as_deref(), Some("/uploads/first.png"));

        let second = service
            .set_question_image(&questions[0].id, vec![2], "b.png", "author")
            .await
            .unwrap();
        assert_eq!(second.image_url.as_deref(), Some("/uploads/second.png"));
    }

    #[tokio::test]
    async fn statistics_count_questions_by_type() {
        let (service, _) = service();
        let (exam, _) = exam_with_questions(&service, &[10.0]).await;
        service.add_question(&exam.id, mcq_draft(5.0), "author").await.unwrap();

        let stats = service.exam_statistics(&exam.id).await.unwrap();
        assert_eq!(stats.total_attempts, 0);
        assert_eq!(stats.questions_by_type.get("true_false"), Some(&1));
        assert_eq!(stats.questions_by_type.get("multiple_choice"), Some(&1));
    }

    #[test]
    fn change_description_lists_fields() {
        let before = test_settings("Algebra");
        let mut after = before.clone();
        assert_eq!(describe_changes(&before, &after), "No changes");

        after.price = 10.0;
        after.attempts = 3;
        assert_eq!(describe_changes(&before, &after), "Changed price, attempts");
    }
}
