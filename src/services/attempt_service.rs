use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::{
    db::{finish, Store, Transaction},
    errors::{AppError, AppResult},
    models::{
        domain::{
            AttemptStatus, ClientInfo, Exam, ExamAttempt, NotificationKind, NotificationPayload,
        },
        dto::response::{AttemptDto, CandidateQuestion},
    },
    services::{catalog_service::load_exam, notification_service::NotificationService},
};

/// Tolerance when comparing summed marks against the exam total.
const SCORE_EPSILON: f64 = 1e-9;

pub(crate) async fn load_attempt(tx: &mut dyn Transaction, attempt_id: &str) -> AppResult<ExamAttempt> {
    tx.find_attempt(attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attempt with id '{}' not found", attempt_id)))
}

pub(crate) fn ensure_owner(attempt: &ExamAttempt, user_id: &str) -> AppResult<()> {
    if attempt.user_id != user_id {
        return Err(AppError::Forbidden(
            "This attempt belongs to another user".into(),
        ));
    }
    Ok(())
}

pub struct AttemptService {
    store: Arc<dyn Store>,
    notifications: Arc<NotificationService>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>, notifications: Arc<NotificationService>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Opens a new attempt. The attempt-slot write makes concurrent starts by
    /// the same user on the same exam conflict, so the limit check holds.
    pub async fn start_attempt(
        &self,
        user_id: &str,
        exam_id: &str,
        client: ClientInfo,
    ) -> AppResult<ExamAttempt> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::start_in(tx.as_mut(), user_id, exam_id, client).await;
        let attempt = finish(tx, outcome).await?;

        log::info!(
            "attempt '{}' started by '{}' on exam '{}'",
            attempt.id,
            user_id,
            exam_id
        );
        Ok(attempt)
    }

    async fn start_in(
        tx: &mut dyn Transaction,
        user_id: &str,
        exam_id: &str,
        client: ClientInfo,
    ) -> AppResult<ExamAttempt> {
        let now = Utc::now();
        let exam = load_exam(tx, exam_id).await?;
        if !exam.is_published {
            return Err(AppError::ExamNotAvailable("exam is not published".into()));
        }
        if !exam.is_within_window(now) {
            return Err(AppError::ExamNotAvailable(
                "exam is outside its scheduled window".into(),
            ));
        }

        tx.claim_attempt_slot(user_id, exam_id).await?;
        let used = tx.count_counted_attempts(user_id, exam_id).await?;
        if !exam.allows_another_attempt(used) {
            return Err(AppError::AttemptLimitExceeded {
                limit: exam.attempts,
            });
        }

        let attempt = ExamAttempt::begin(user_id, &exam, client, now);
        tx.insert_attempt(&attempt).await?;
        Ok(attempt)
    }

    pub async fn submit(&self, attempt_id: &str, user_id: &str) -> AppResult<ExamAttempt> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::submit_in(tx.as_mut(), attempt_id, user_id).await;
        let attempt = finish(tx, outcome).await?;

        log::info!("attempt '{}' submitted", attempt.id);
        Ok(attempt)
    }

    async fn submit_in(
        tx: &mut dyn Transaction,
        attempt_id: &str,
        user_id: &str,
    ) -> AppResult<ExamAttempt> {
        let mut attempt = load_attempt(tx, attempt_id).await?;
        ensure_owner(&attempt, user_id)?;

        attempt.close(AttemptStatus::Submitted, Utc::now(), false)?;
        tx.replace_attempt(&attempt).await?;
        Ok(attempt)
    }

    /// Timeout path. Attempts that are no longer in progress are returned untouched.
    pub async fn auto_submit(&self, attempt_id: &str) -> AppResult<ExamAttempt> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::auto_submit_in(tx.as_mut(), attempt_id).await;
        finish(tx, outcome).await
    }

    async fn auto_submit_in(tx: &mut dyn Transaction, attempt_id: &str) -> AppResult<ExamAttempt> {
        let mut attempt = load_attempt(tx, attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Ok(attempt);
        }

        let answered = !tx.list_attempt_answers(attempt_id).await?.is_empty();
        let next = if answered {
            AttemptStatus::Submitted
        } else {
            AttemptStatus::Completed
        };
        attempt.close(next, Utc::now(), true)?;
        tx.replace_attempt(&attempt).await?;

        log::info!("attempt '{}' auto-submitted as {}", attempt.id, next);
        Ok(attempt)
    }

    /// Finalizes the score of a submitted attempt and notifies its owner.
    pub async fn evaluate(&self, attempt_id: &str) -> AppResult<ExamAttempt> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::evaluate_in(tx.as_mut(), attempt_id).await;
        let (attempt, exam) = finish(tx, outcome).await?;

        log::info!(
            "attempt '{}' evaluated with score {}",
            attempt.id,
            attempt.score
        );

        let message = if exam.show_result {
            format!(
                "Your attempt at '{}' scored {} out of {}",
                exam.title, attempt.score, exam.total_marks
            )
        } else {
            format!("Your attempt at '{}' has been evaluated", exam.title)
        };
        self.notifications
            .notify_best_effort(
                &attempt.user_id,
                NotificationPayload {
                    kind: NotificationKind::Exam,
                    title: "Exam evaluated".to_string(),
                    message,
                    link: format!("/api/attempts/{}", attempt.id),
                },
            )
            .await;

        Ok(attempt)
    }

    async fn evaluate_in(
        tx: &mut dyn Transaction,
        attempt_id: &str,
    ) -> AppResult<(ExamAttempt, Exam)> {
        let mut attempt = load_attempt(tx, attempt_id).await?;
        if attempt.status != AttemptStatus::Submitted {
            return Err(AppError::state_transition(
                attempt.status,
                AttemptStatus::Evaluated,
            ));
        }

        let answers = tx.list_attempt_answers(attempt_id).await?;
        if answers.iter().any(|a| a.is_pending()) {
            return Err(AppError::PendingReview(attempt_id.to_string()));
        }

        let exam = load_exam(tx, &attempt.exam_id).await?;
        let score = answers
            .iter()
            .map(|a| a.marks.unwrap_or(0.0))
            .sum::<f64>()
            .max(0.0);
        if score > exam.total_marks + SCORE_EPSILON {
            log::error!(
                "attempt '{}' scored {} above exam '{}' total of {}",
                attempt_id,
                score,
                exam.id,
                exam.total_marks
            );
            return Err(AppError::IntegrityViolation(format!(
                "score {} exceeds total marks {}",
                score, exam.total_marks
            )));
        }

        attempt.mark_evaluated(score, Utc::now())?;
        tx.replace_attempt(&attempt).await?;
        Ok((attempt, exam))
    }

    /// Soft-deletes a finished attempt so it no longer counts toward the limit.
    pub async fn drop_attempt(&self, attempt_id: &str, dropped_by: &str) -> AppResult<ExamAttempt> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::drop_in(tx.as_mut(), attempt_id).await;
        let attempt = finish(tx, outcome).await?;

        log::info!("attempt '{}' dropped by '{}'", attempt.id, dropped_by);
        Ok(attempt)
    }

    async fn drop_in(tx: &mut dyn Transaction, attempt_id: &str) -> AppResult<ExamAttempt> {
        let mut attempt = load_attempt(tx, attempt_id).await?;
        if attempt.is_dropped() {
            return Ok(attempt);
        }
        if !attempt.status.is_terminal() {
            return Err(AppError::InvalidStateTransition {
                from: attempt.status.to_string(),
                to: "dropped".to_string(),
            });
        }

        let now = Utc::now();
        attempt.dropped_at = Some(now);
        attempt.modified_at = Some(now);
        tx.replace_attempt(&attempt).await?;
        Ok(attempt)
    }

    /// Questions of an in-progress attempt with the answers stripped.
    pub async fn questions_for_attempt(
        &self,
        attempt_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<CandidateQuestion>> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::questions_in(tx.as_mut(), attempt_id, user_id).await;
        let (mut questions, shuffle) = finish(tx, outcome).await?;

        if shuffle {
            questions.shuffle(&mut rand::thread_rng());
        }
        Ok(questions)
    }

    async fn questions_in(
        tx: &mut dyn Transaction,
        attempt_id: &str,
        user_id: &str,
    ) -> AppResult<(Vec<CandidateQuestion>, bool)> {
        let attempt = load_attempt(tx, attempt_id).await?;
        ensure_owner(&attempt, user_id)?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(AppError::ValidationError(format!(
                "Attempt '{}' is {}",
                attempt_id, attempt.status
            )));
        }

        let exam = load_exam(tx, &attempt.exam_id).await?;
        let questions = tx.list_questions(&exam.id).await?;
        Ok((
            questions.iter().map(CandidateQuestion::from).collect(),
            exam.shuffle_questions,
        ))
    }

    /// Auto-submits every in-progress attempt past its deadline. Each attempt
    /// is closed in its own unit of work; failures are logged and skipped.
    pub async fn sweep_expired(&self) -> AppResult<usize> {
        let mut tx = self.store.begin().await?;
        let outcome = tx.list_expired_attempts(Utc::now()).await;
        let expired = finish(tx, outcome).await?;

        let mut closed = 0;
        for attempt in expired {
            match self.auto_submit(&attempt.id).await {
                Ok(_) => closed += 1,
                Err(e) => log::warn!("failed to auto-submit attempt '{}': {}", attempt.id, e),
            }
        }
        if closed > 0 {
            log::info!("auto-submitted {} expired attempts", closed);
        }
        Ok(closed)
    }

    /// The attempt together with whether its exam shows results.
    pub async fn get_attempt(&self, attempt_id: &str) -> AppResult<(ExamAttempt, bool)> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::get_in(tx.as_mut(), attempt_id).await;
        finish(tx, outcome).await
    }

    async fn get_in(tx: &mut dyn Transaction, attempt_id: &str) -> AppResult<(ExamAttempt, bool)> {
        let attempt = load_attempt(tx, attempt_id).await?;
        let show_result = tx
            .find_exam(&attempt.exam_id)
            .await?
            .map_or(true, |exam| exam.show_result);
        Ok((attempt, show_result))
    }

    pub async fn list_user_attempts(&self, user_id: &str) -> AppResult<Vec<AttemptDto>> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::list_user_in(tx.as_mut(), user_id).await;
        finish(tx, outcome).await
    }

    async fn list_user_in(tx: &mut dyn Transaction, user_id: &str) -> AppResult<Vec<AttemptDto>> {
        let attempts = tx.list_user_attempts(user_id).await?;
        let mut views = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let show_result = tx
                .find_exam(&attempt.exam_id)
                .await?
                .map_or(true, |exam| exam.show_result);
            views.push(AttemptDto::from_attempt(attempt, show_result));
        }
        Ok(views)
    }

    pub async fn list_exam_attempts(&self, exam_id: &str) -> AppResult<Vec<ExamAttempt>> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::list_exam_in(tx.as_mut(), exam_id).await;
        finish(tx, outcome).await
    }

    async fn list_exam_in(tx: &mut dyn Transaction, exam_id: &str) -> AppResult<Vec<ExamAttempt>> {
        load_exam(tx, exam_id).await?;
        tx.list_exam_attempts(exam_id).await
    }
}
