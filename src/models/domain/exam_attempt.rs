use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::domain::Exam;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Submitted,
    Evaluated,
}

impl AttemptStatus {
    /// Forward-only transitions; anything not listed here is illegal.
    pub fn can_transition_to(self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::InProgress, AttemptStatus::Submitted)
                | (AttemptStatus::InProgress, AttemptStatus::Completed)
                | (AttemptStatus::Submitted, AttemptStatus::Evaluated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Evaluated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Evaluated => "evaluated",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub browser_info: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExamAttempt {
    pub id: String,
    pub user_id: String,
    pub exam_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AttemptStatus,
    pub score: f64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub time_spent_secs: i64,
    pub auto_submitted: bool,
    pub ip_address: Option<String>,
    pub browser_info: Option<String>,
    pub dropped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ExamAttempt {
    /// Starts an attempt now; the deadline is the exam duration, capped by the exam's end time.
    pub fn begin(user_id: &str, exam: &Exam, client: ClientInfo, now: DateTime<Utc>) -> Self {
        let mut deadline = now + Duration::minutes(exam.duration_minutes as i64);
        if let Some(exam_end) = exam.end_time {
            deadline = deadline.min(exam_end);
        }

        ExamAttempt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            exam_id: exam.id.clone(),
            start_time: now,
            end_time: deadline,
            status: AttemptStatus::InProgress,
            score: 0.0,
            submitted_at: None,
            evaluated_at: None,
            time_spent_secs: 0,
            auto_submitted: false,
            ip_address: client.ip_address,
            browser_info: client.browser_info,
            dropped_at: None,
            created_at: Some(now),
            modified_at: Some(now),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped_at.is_some()
    }

    fn transition(&mut self, next: AttemptStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::state_transition(self.status, next));
        }
        self.status = next;
        self.modified_at = Some(Utc::now());
        Ok(())
    }

    /// Closes the attempt, recording when it was handed in and how long it took.
    pub fn close(&mut self, next: AttemptStatus, now: DateTime<Utc>, auto: bool) -> AppResult<()> {
        self.transition(next)?;
        self.submitted_at = Some(now);
        self.time_spent_secs = (now - self.start_time).num_seconds().max(0);
        self.auto_submitted = auto;
        Ok(())
    }

    pub fn mark_evaluated(&mut self, score: f64, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(AttemptStatus::Evaluated)?;
        self.score = score;
        self.evaluated_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::exam::test_settings;

    fn exam() -> Exam {
        Exam::new_draft(test_settings("Physics"), "creator")
    }

    #[test]
    fn transitions_are_forward_only() {
        use AttemptStatus::*;
        assert!(InProgress.can_transition_to(Submitted));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Submitted.can_transition_to(Evaluated));

        assert!(!InProgress.can_transition_to(Evaluated));
        assert!(!Submitted.can_transition_to(InProgress));
        assert!(!Evaluated.can_transition_to(Submitted));
        assert!(!Completed.can_transition_to(Evaluated));
        assert!(!Submitted.can_transition_to(Submitted));
    }

    #[test]
    fn deadline_is_capped_by_exam_end() {
        let now = Utc::now();
        let mut exam = exam();
        exam.end_time = Some(now + Duration::minutes(10));

        let attempt = ExamAttempt::begin("user", &exam, ClientInfo::default(), now);
        assert_eq!(attempt.end_time, now + Duration::minutes(10));
        assert_eq!(attempt.status, AttemptStatus::InProgress);
    }

    #[test]
    fn close_records_time_spent() {
        let start = Utc::now();
        let mut attempt = ExamAttempt::begin("user", &exam(), ClientInfo::default(), start);

        attempt
            .close(AttemptStatus::Submitted, start + Duration::seconds(95), false)
            .unwrap();

        assert_eq!(attempt.time_spent_secs, 95);
        assert_eq!(attempt.submitted_at, Some(start + Duration::seconds(95)));
        assert!(!attempt.auto_submitted);
    }

    #[test]
    fn evaluate_from_in_progress_is_rejected_without_mutation() {
        let mut attempt = ExamAttempt::begin("user", &exam(), ClientInfo::default(), Utc::now());
        let before = attempt.clone();

        let err = attempt.mark_evaluated(10.0, Utc::now()).unwrap_err();

        assert!(matches!(err, AppError::InvalidStateTransition { .. }));
        assert_eq!(attempt, before);
    }
}
