use std::sync::Arc;

use chrono::Utc;

use crate::{
    db::{finish, Store, Transaction},
    errors::{AppError, AppResult},
    models::domain::{Answer, AnswerValue, AttemptStatus, ExamAttempt},
    services::{
        attempt_service::{ensure_owner, load_attempt},
        catalog_service::load_question,
    },
};

/// Sum of the marks recorded so far, floored at zero.
fn provisional_score(answers: &[Answer]) -> f64 {
    answers
        .iter()
        .filter_map(|a| a.marks)
        .sum::<f64>()
        .max(0.0)
}

async fn load_answer(tx: &mut dyn Transaction, answer_id: &str) -> AppResult<Answer> {
    tx.find_answer(answer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Answer with id '{}' not found", answer_id)))
}

async fn refresh_score(tx: &mut dyn Transaction, attempt: &mut ExamAttempt) -> AppResult<()> {
    let answers = tx.list_attempt_answers(&attempt.id).await?;
    attempt.score = provisional_score(&answers);
    attempt.modified_at = Some(Utc::now());
    tx.replace_attempt(attempt).await
}

pub struct AnswerService {
    store: Arc<dyn Store>,
}

impl AnswerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Records or replaces the candidate's answer to one question and
    /// refreshes the attempt's provisional score.
    pub async fn submit_answer(
        &self,
        attempt_id: &str,
        user_id: &str,
        question_id: &str,
        value: AnswerValue,
    ) -> AppResult<Answer> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::submit_in(tx.as_mut(), attempt_id, user_id, question_id, value).await;
        finish(tx, outcome).await
    }

    async fn submit_in(
        tx: &mut dyn Transaction,
        attempt_id: &str,
        user_id: &str,
        question_id: &str,
        value: AnswerValue,
    ) -> AppResult<Answer> {
        let mut attempt = load_attempt(tx, attempt_id).await?;
        ensure_owner(&attempt, user_id)?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(AppError::ValidationError(format!(
                "Attempt '{}' is {} and no longer accepts answers",
                attempt_id, attempt.status
            )));
        }
        if attempt.is_expired(Utc::now()) {
            return Err(AppError::AttemptExpired(attempt_id.to_string()));
        }

        let question = load_question(tx, question_id).await?;
        if question.exam_id != attempt.exam_id {
            return Err(AppError::ValidationError(format!(
                "Question '{}' does not belong to this exam",
                question_id
            )));
        }
        value.validate_for(&question.kind)?;

        let answer = match tx.find_answer_for(attempt_id, question_id).await? {
            Some(mut existing) => {
                existing.regrade(&question, value);
                existing
            }
            None => Answer::graded(attempt_id, &question, value),
        };
        tx.save_answer(&answer).await?;

        refresh_score(tx, &mut attempt).await?;
        Ok(answer)
    }

    /// Manual marking of an answer on a handed-in attempt.
    pub async fn review_answer(
        &self,
        answer_id: &str,
        marks: f64,
        feedback: Option<String>,
        reviewer: &str,
    ) -> AppResult<Answer> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::review_in(tx.as_mut(), answer_id, marks, feedback, reviewer).await;
        let answer = finish(tx, outcome).await?;

        log::info!("answer '{}' reviewed by '{}'", answer.id, reviewer);
        Ok(answer)
    }

    async fn review_in(
        tx: &mut dyn Transaction,
        answer_id: &str,
        marks: f64,
        feedback: Option<String>,
        reviewer: &str,
    ) -> AppResult<Answer> {
        let mut answer = load_answer(tx, answer_id).await?;

        let mut attempt = load_attempt(tx, &answer.attempt_id).await?;
        if !matches!(
            attempt.status,
            AttemptStatus::Submitted | AttemptStatus::Completed
        ) {
            return Err(AppError::InvalidStateTransition {
                from: attempt.status.to_string(),
                to: "reviewed".to_string(),
            });
        }

        let question = load_question(tx, &answer.question_id).await?;
        answer.review(&question, marks, feedback, reviewer)?;
        tx.save_answer(&answer).await?;

        refresh_score(tx, &mut attempt).await?;
        Ok(answer)
    }

    pub async fn get_answer(&self, answer_id: &str) -> AppResult<Answer> {
        let mut tx = self.store.begin().await?;
        let outcome = load_answer(tx.as_mut(), answer_id).await;
        finish(tx, outcome).await
    }

    pub async fn list_attempt_answers(&self, attempt_id: &str) -> AppResult<Vec<Answer>> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::list_in(tx.as_mut(), attempt_id).await;
        finish(tx, outcome).await
    }

    async fn list_in(tx: &mut dyn Transaction, attempt_id: &str) -> AppResult<Vec<Answer>> {
        load_attempt(tx, attempt_id).await?;
        tx.list_attempt_answers(attempt_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::domain::{
        exam::test_settings,
        question::{mcq_draft, QuestionKind},
        ClientInfo, Exam, Question, QuestionDraft, ReviewStatus,
    };
    use crate::repositories::InMemoryNotificationRepository;
    use crate::services::{
        attempt_service::AttemptService, catalog_service::CatalogService,
        file_store::MockFileStore, notification_service::NotificationService,
    };
    use chrono::Duration;

    struct Fixture {
        answers: AnswerService,
        attempts: AttemptService,
        catalog: CatalogService,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(NotificationService::new(
            Arc::new(InMemoryNotificationRepository::new()),
            30,
        ));
        Fixture {
            answers: AnswerService::new(store.clone()),
            attempts: AttemptService::new(store.clone(), notifications),
            catalog: CatalogService::new(store.clone(), Arc::new(MockFileStore::new())),
            store,
        }
    }

    fn essay(marks: f64) -> QuestionDraft {
        QuestionDraft {
            text: "Explain osmosis".to_string(),
            kind: QuestionKind::Descriptive { model_answer: None },
            marks,
            negative_marks: 0.0,
            explanation: None,
            difficulty: Default::default(),
        }
    }

    /// Published exam with a 10 mark MCQ (2 negative) and a 20 mark essay.
    async fn setup(f: &Fixture) -> (Exam, Question, Question, ExamAttempt) {
        let mut settings = test_settings("Biology");
        settings.passing_marks = 10.0;
        settings.attempts = -1;
        let exam = f.catalog.create_exam(settings, "author").await.unwrap();

        let mut mcq = mcq_draft(10.0);
        mcq.negative_marks = 2.0;
        let mcq = f.catalog.add_question(&exam.id, mcq, "author").await.unwrap();
        let essay = f.catalog.add_question(&exam.id, essay(20.0), "author").await.unwrap();
        let exam = f.catalog.publish(&exam.id, "author").await.unwrap();

        let attempt = f
            .attempts
            .start_attempt("student", &exam.id, ClientInfo::default())
            .await
            .unwrap();
        (exam, mcq, essay, attempt)
    }

    #[tokio::test]
    async fn answers_are_graded_and_upserted() {
        let f = fixture();
        let (_, mcq, _, attempt) = setup(&f).await;

        let wrong = f
            .answers
            .submit_answer(
                &attempt.id,
                "student",
                &mcq.id,
                AnswerValue::MultipleChoice { selected: vec![1] },
            )
            .await
            .unwrap();
        assert_eq!(wrong.is_correct, Some(false));
        assert_eq!(wrong.marks, Some(-2.0));

        let (current, _) = f.attempts.get_attempt(&attempt.id).await.unwrap();
        assert_eq!(current.score, 0.0);

        let right = f
            .answers
            .submit_answer(
                &attempt.id,
                "student",
                &mcq.id,
                AnswerValue::MultipleChoice {
                    selected: vec![2, 0],
                },
            )
            .await
            .unwrap();
        assert_eq!(right.id, wrong.id);
        assert_eq!(right.marks, Some(10.0));

        let answers = f.answers.list_attempt_answers(&attempt.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        let (current, _) = f.attempts.get_attempt(&attempt.id).await.unwrap();
        assert_eq!(current.score, 10.0);
    }

    #[tokio::test]
    async fn malformed_answers_are_rejected() {
        let f = fixture();
        let (_, mcq, essay, attempt) = setup(&f).await;

        for (question, value) in [
            (&mcq, AnswerValue::TrueFalse { value: true }),
            (&mcq, AnswerValue::MultipleChoice { selected: vec![] }),
            (&mcq, AnswerValue::MultipleChoice { selected: vec![9] }),
            (&essay, AnswerValue::Descriptive { text: "  ".into() }),
        ] {
            let result = f
                .answers
                .submit_answer(&attempt.id, "student", &question.id, value)
                .await;
            assert!(matches!(result, Err(AppError::InvalidAnswerFormat(_))));
        }
        assert!(f
            .answers
            .list_attempt_answers(&attempt.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn answers_after_the_deadline_are_refused() {
        let f = fixture();
        let (_, mcq, _, mut attempt) = setup(&f).await;
        attempt.end_time = Utc::now() - Duration::seconds(1);
        {
            let mut tx = f.store.begin().await.unwrap();
            tx.replace_attempt(&attempt).await.unwrap();
            tx.commit().await.unwrap();
        }

        let result = f
            .answers
            .submit_answer(
                &attempt.id,
                "student",
                &mcq.id,
                AnswerValue::MultipleChoice { selected: vec![0] },
            )
            .await;
        assert!(matches!(result, Err(AppError::AttemptExpired(_))));
    }

    #[tokio::test]
    async fn questions_from_other_exams_are_rejected() {
        let f = fixture();
        let (_, _, _, attempt) = setup(&f).await;
        let other = f
            .catalog
            .create_exam(test_settings("Other"), "author")
            .await
            .unwrap();
        let foreign = f
            .catalog
            .add_question(&other.id, essay(5.0), "author")
            .await
            .unwrap();

        let result = f
            .answers
            .submit_answer(
                &attempt.id,
                "student",
                &foreign.id,
                AnswerValue::Descriptive { text: "hi".into() },
            )
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn descriptive_answers_block_evaluation_until_reviewed() {
        let f = fixture();
        let (_, mcq, essay, attempt) = setup(&f).await;

        f.answers
            .submit_answer(
                &attempt.id,
                "student",
                &mcq.id,
                AnswerValue::MultipleChoice {
                    selected: vec![0, 2],
                },
            )
            .await
            .unwrap();
        let pending = f
            .answers
            .submit_answer(
                &attempt.id,
                "student",
                &essay.id,
                AnswerValue::Descriptive {
                    text: "Water moves across a membrane".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(pending.review_status, ReviewStatus::Pending);
        assert!(pending.marks.is_none());

        // Reviews wait for submission.
        assert!(matches!(
            f.answers.review_answer(&pending.id, 5.0, None, "grader").await,
            Err(AppError::InvalidStateTransition { .. })
        ));

        f.attempts.submit(&attempt.id, "student").await.unwrap();
        assert!(matches!(
            f.attempts.evaluate(&attempt.id).await,
            Err(AppError::PendingReview(_))
        ));

        assert!(matches!(
            f.answers.review_answer(&pending.id, 25.0, None, "grader").await,
            Err(AppError::MarksExceedQuestion { .. })
        ));
        assert!(f
            .answers
            .review_answer(&pending.id, -1.0, None, "grader")
            .await
            .is_err());

        let reviewed = f
            .answers
            .review_answer(&pending.id, 15.0, Some("Good".into()), "grader")
            .await
            .unwrap();
        assert_eq!(reviewed.review_status, ReviewStatus::Reviewed);

        let evaluated = f.attempts.evaluate(&attempt.id).await.unwrap();
        assert_eq!(evaluated.score, 25.0);

        assert!(f
            .answers
            .review_answer(&pending.id, 20.0, None, "grader")
            .await
            .is_err());
    }

    #[test]
    fn provisional_score_is_never_negative() {
        let question = Question::from_draft(mcq_draft(5.0), "exam", 1, "author");
        let mut wrong = Answer::graded(
            "attempt",
            &question,
            AnswerValue::MultipleChoice { selected: vec![1] },
        );
        wrong.marks = Some(-3.0);
        assert_eq!(provisional_score(&[wrong]), 0.0);
    }
}
