use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::domain::question::{Difficulty, QuestionType, RedactedKind};
use crate::models::domain::user::NotificationPreferences;
use crate::models::domain::{Answer, AnswerValue, Exam, ExamAttempt, Question, User};

#[derive(Debug, Clone, Serialize)]
pub struct UserDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub notification_preferences: NotificationPreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        UserDto {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            profile_image: user.profile_image,
            is_active: user.is_active,
            email_verified: user.email_verified,
            last_login: user.last_login,
            notification_preferences: user.notification_preferences,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        ApiResponse {
            data,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserDto,
}

/// A question as a candidate sees it during an attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateQuestion {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: RedactedKind,
    pub marks: f64,
    pub negative_marks: f64,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub order: i32,
}

impl From<&Question> for CandidateQuestion {
    fn from(question: &Question) -> Self {
        CandidateQuestion {
            id: question.id.clone(),
            text: question.text.clone(),
            kind: question.kind.redacted(),
            marks: question.marks,
            negative_marks: question.negative_marks,
            difficulty: question.difficulty,
            image_url: question.image_url.clone(),
            order: question.order,
        }
    }
}

/// Attempt view returned to the candidate. The score appears only once the
/// attempt is evaluated, and never when the exam hides results.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptDto {
    pub id: String,
    pub exam_id: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub time_spent_secs: i64,
    pub auto_submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl AttemptDto {
    pub fn from_attempt(attempt: ExamAttempt, show_result: bool) -> Self {
        AttemptDto {
            score: (show_result && attempt.evaluated_at.is_some()).then_some(attempt.score),
            id: attempt.id,
            exam_id: attempt.exam_id,
            status: attempt.status.to_string(),
            start_time: attempt.start_time,
            end_time: attempt.end_time,
            submitted_at: attempt.submitted_at,
            evaluated_at: attempt.evaluated_at,
            time_spent_secs: attempt.time_spent_secs,
            auto_submitted: attempt.auto_submitted,
        }
    }
}

/// Acknowledges a candidate's answer without revealing how it was graded.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedAnswer {
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    pub answer: AnswerValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl From<Answer> for SubmittedAnswer {
    fn from(answer: Answer) -> Self {
        SubmittedAnswer {
            id: answer.id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            answer: answer.value,
            saved_at: answer.modified_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamStatistics {
    pub exam_id: String,
    pub total_attempts: u64,
    pub evaluated_attempts: u64,
    pub average_score: f64,
    pub highest_score: f64,
    pub pass_rate: f64,
    pub questions_by_type: BTreeMap<String, u64>,
}

impl ExamStatistics {
    /// Aggregates over evaluated scores; `pass_rate` is a percentage.
    pub fn compute(
        exam_id: &str,
        passing_marks: f64,
        attempts: &[ExamAttempt],
        questions: &[Question],
    ) -> Self {
        let scores: Vec<f64> = attempts
            .iter()
            .filter(|a| a.evaluated_at.is_some())
            .map(|a| a.score)
            .collect();

        let evaluated = scores.len() as u64;
        let (average, highest, pass_rate) = if scores.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = scores.iter().sum();
            let highest = scores.iter().cloned().fold(f64::MIN, f64::max);
            let passed = scores.iter().filter(|&&s| s >= passing_marks).count();
            (
                sum / scores.len() as f64,
                highest,
                passed as f64 * 100.0 / scores.len() as f64,
            )
        };

        let mut questions_by_type = BTreeMap::new();
        for question in questions {
            *questions_by_type
                .entry(question_type_name(question.kind.question_type()).to_string())
                .or_insert(0) += 1;
        }

        ExamStatistics {
            exam_id: exam_id.to_string(),
            total_attempts: attempts.len() as u64,
            evaluated_attempts: evaluated,
            average_score: average,
            highest_score: highest,
            pass_rate,
            questions_by_type,
        }
    }
}

fn question_type_name(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::MultipleChoice => "multiple_choice",
        QuestionType::TrueFalse => "true_false",
        QuestionType::MatchPairs => "match_pairs",
        QuestionType::Descriptive => "descriptive",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentTotal {
    pub payment_for: String,
    pub currency: String,
    pub total_amount: f64,
    pub count: u64,
}

/// An open exam as listed on a candidate's dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ExamSummary {
    pub id: String,
    pub title: String,
    pub duration_minutes: i32,
    pub total_marks: f64,
    pub attempts: i32,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&Exam> for ExamSummary {
    fn from(exam: &Exam) -> Self {
        ExamSummary {
            id: exam.id.clone(),
            title: exam.title.clone(),
            duration_minutes: exam.duration_minutes,
            total_marks: exam.total_marks,
            attempts: exam.attempts,
            end_time: exam.end_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardAttempt {
    #[serde(flatten)]
    pub attempt: AttemptDto,
    pub exam_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

/// Scores here only cover evaluated attempts on exams that show results.
#[derive(Debug, Clone, Serialize)]
pub struct UserDashboard {
    pub total_attempts: u64,
    pub evaluated_attempts: u64,
    pub passed: u64,
    pub average_score: f64,
    pub highest_score: f64,
    pub recent_attempts: Vec<DashboardAttempt>,
    pub open_exams: Vec<ExamSummary>,
    pub unread_notifications: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultsSummary {
    pub evaluated: u64,
    pub passed: u64,
    pub failed: u64,
    pub average_score: f64,
}

impl ResultsSummary {
    /// Each entry is an attempt with its exam's passing marks; unevaluated attempts are skipped.
    pub fn compute<'a>(attempts: impl IntoIterator<Item = (&'a ExamAttempt, f64)>) -> Self {
        let mut summary = ResultsSummary::default();
        let mut sum = 0.0;
        for (attempt, passing_marks) in attempts {
            if attempt.evaluated_at.is_none() {
                continue;
            }
            summary.evaluated += 1;
            sum += attempt.score;
            if attempt.score >= passing_marks {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
        }
        if summary.evaluated > 0 {
            summary.average_score = sum / summary.evaluated as f64;
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentAttempt {
    pub attempt_id: String,
    pub user_id: String,
    pub exam_id: String,
    pub exam_title: Option<String>,
    pub status: String,
    pub score: f64,
    /// Score as a percentage of the exam total, when the exam still exists.
    pub score_percent: Option<f64>,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub total_users: i64,
    pub total_exams: i64,
    pub total_attempts: i64,
    pub results: ResultsSummary,
    pub revenue: Vec<PaymentTotal>,
    pub recent_attempts: Vec<RecentAttempt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCount {
    pub unread: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResult {
    pub delivered: usize,
    pub failed: usize,
}
