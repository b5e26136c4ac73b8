use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    db::{finish, Store, Transaction},
    errors::AppResult,
    models::{
        domain::{Exam, ExamAttempt},
        dto::response::{
            AdminOverview, AttemptDto, DashboardAttempt, ExamSummary, RecentAttempt,
            ResultsSummary, UserDashboard,
        },
    },
    repositories::ExamFilter,
    services::{notification_service::NotificationService, payment_service::PaymentService},
};

const RECENT_LIMIT: usize = 5;
/// How many of the newest attempts the admin results summary covers.
const RESULTS_WINDOW: i64 = 50;
const OPEN_EXAM_SCAN: i64 = 100;
const DEFAULT_REVENUE_DAYS: i64 = 30;

/// Exams referenced by `attempts`, keyed by id; soft-deleted exams are absent.
async fn exams_for(
    tx: &mut dyn Transaction,
    attempts: &[ExamAttempt],
) -> AppResult<HashMap<String, Exam>> {
    let mut exams = HashMap::new();
    for attempt in attempts {
        if exams.contains_key(&attempt.exam_id) {
            continue;
        }
        if let Some(exam) = tx.find_exam(&attempt.exam_id).await? {
            exams.insert(exam.id.clone(), exam);
        }
    }
    Ok(exams)
}

struct DashboardData {
    attempts: Vec<ExamAttempt>,
    exams: HashMap<String, Exam>,
    open_exams: Vec<Exam>,
}

struct OverviewData {
    total_users: i64,
    total_exams: i64,
    total_attempts: i64,
    recent: Vec<ExamAttempt>,
    exams: HashMap<String, Exam>,
}

/// Read-only summaries for the candidate dashboard and the admin overview.
pub struct ReportService {
    store: Arc<dyn Store>,
    notifications: Arc<NotificationService>,
    payments: Arc<PaymentService>,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn Store>,
        notifications: Arc<NotificationService>,
        payments: Arc<PaymentService>,
    ) -> Self {
        Self {
            store,
            notifications,
            payments,
        }
    }

    pub async fn dashboard(&self, user_id: &str) -> AppResult<UserDashboard> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let outcome = Self::dashboard_in(tx.as_mut(), user_id, now).await;
        let data = finish(tx, outcome).await?;
        let unread_notifications = self.notifications.unread_count(user_id).await?;

        // Hidden results stay out of every score figure.
        let visible: Vec<(&ExamAttempt, &Exam)> = data
            .attempts
            .iter()
            .filter_map(|a| data.exams.get(&a.exam_id).map(|e| (a, e)))
            .filter(|(_, e)| e.show_result)
            .collect();
        let results = ResultsSummary::compute(visible.iter().map(|(a, e)| (*a, e.passing_marks)));
        let highest_score = visible
            .iter()
            .filter(|(a, _)| a.evaluated_at.is_some())
            .map(|(a, _)| a.score)
            .fold(0.0, f64::max);

        let recent_attempts = data
            .attempts
            .iter()
            .take(RECENT_LIMIT)
            .map(|attempt| {
                let exam = data.exams.get(&attempt.exam_id);
                let show_result = exam.is_some_and(|e| e.show_result);
                DashboardAttempt {
                    passed: exam
                        .filter(|_| show_result && attempt.evaluated_at.is_some())
                        .map(|e| attempt.score >= e.passing_marks),
                    exam_title: exam.map(|e| e.title.clone()).unwrap_or_default(),
                    attempt: AttemptDto::from_attempt(attempt.clone(), show_result),
                }
            })
            .collect();

        Ok(UserDashboard {
            total_attempts: data.attempts.len() as u64,
            evaluated_attempts: results.evaluated,
            passed: results.passed,
            average_score: results.average_score,
            highest_score,
            recent_attempts,
            open_exams: data.open_exams.iter().map(ExamSummary::from).collect(),
            unread_notifications,
        })
    }

    async fn dashboard_in(
        tx: &mut dyn Transaction,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<DashboardData> {
        let attempts = tx.list_user_attempts(user_id).await?;
        let exams = exams_for(tx, &attempts).await?;

        let published = ExamFilter {
            published: Some(true),
            created_by: None,
        };
        let (candidates, _) = tx.list_exams(&published, 0, OPEN_EXAM_SCAN).await?;
        let mut open_exams: Vec<Exam> = candidates
            .into_iter()
            .filter(|e| e.is_within_window(now))
            .collect();
        // Closing soonest first; exams without an end come last.
        open_exams.sort_by_key(|e| (e.end_time.is_none(), e.end_time));
        open_exams.truncate(RECENT_LIMIT);

        Ok(DashboardData {
            attempts,
            exams,
            open_exams,
        })
    }

    /// Site-wide counts, results over the newest attempts and completed
    /// revenue between `from` and `to` (default: the last 30 days).
    pub async fn overview(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<AdminOverview> {
        let to = to.unwrap_or_else(Utc::now);
        let from = from.unwrap_or(to - Duration::days(DEFAULT_REVENUE_DAYS));
        let revenue = self.payments.statistics(from, to).await?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::overview_in(tx.as_mut()).await;
        let data = finish(tx, outcome).await?;

        let results = ResultsSummary::compute(data.recent.iter().filter_map(|a| {
            data.exams.get(&a.exam_id).map(|e| (a, e.passing_marks))
        }));
        let recent_attempts = data
            .recent
            .iter()
            .take(RECENT_LIMIT)
            .map(|attempt| {
                let exam = data.exams.get(&attempt.exam_id);
                RecentAttempt {
                    attempt_id: attempt.id.clone(),
                    user_id: attempt.user_id.clone(),
                    exam_id: attempt.exam_id.clone(),
                    exam_title: exam.map(|e| e.title.clone()),
                    status: attempt.status.to_string(),
                    score: attempt.score,
                    score_percent: exam
                        .filter(|e| e.total_marks > 0.0)
                        .map(|e| (attempt.score / e.total_marks * 1000.0).round() / 10.0),
                    start_time: attempt.start_time,
                }
            })
            .collect();

        Ok(AdminOverview {
            total_users: data.total_users,
            total_exams: data.total_exams,
            total_attempts: data.total_attempts,
            results,
            revenue,
            recent_attempts,
        })
    }

    async fn overview_in(tx: &mut dyn Transaction) -> AppResult<OverviewData> {
        let (_, total_users) = tx.list_users(0, 1).await?;
        let (_, total_exams) = tx.list_exams(&ExamFilter::default(), 0, 1).await?;
        let (recent, total_attempts) = tx.list_attempts(0, RESULTS_WINDOW).await?;
        let exams = exams_for(tx, &recent).await?;

        Ok(OverviewData {
            total_users,
            total_exams,
            total_attempts,
            recent,
            exams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::domain::{
        exam::test_settings, AttemptStatus, ClientInfo, NotificationKind, NotificationPayload,
        User,
    };
    use crate::repositories::InMemoryNotificationRepository;

    struct Fixture {
        reports: ReportService,
        notifications: Arc<NotificationService>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(NotificationService::new(
            Arc::new(InMemoryNotificationRepository::new()),
            30,
        ));
        let payments = Arc::new(PaymentService::new(store.clone(), notifications.clone()));
        Fixture {
            reports: ReportService::new(store.clone(), notifications.clone(), payments),
            notifications,
            store,
        }
    }

    fn published(title: &str, show_result: bool) -> Exam {
        let mut settings = test_settings(title);
        settings.show_result = show_result;
        let mut exam = Exam::new_draft(settings, "author");
        exam.total_marks = 100.0;
        exam.question_count = 2;
        exam.is_published = true;
        exam
    }

    fn evaluated(user_id: &str, exam: &Exam, score: f64) -> ExamAttempt {
        let mut attempt = ExamAttempt::begin(user_id, exam, ClientInfo::default(), Utc::now());
        attempt.status = AttemptStatus::Evaluated;
        attempt.score = score;
        attempt.evaluated_at = Some(Utc::now());
        attempt
    }

    async fn save(store: &MemoryStore, exams: &[&Exam], attempts: &[&ExamAttempt]) {
        let mut tx = store.begin().await.unwrap();
        for exam in exams {
            tx.insert_exam(exam).await.unwrap();
        }
        for attempt in attempts {
            tx.insert_attempt(attempt).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn dashboard_hides_scores_of_exams_that_hide_results() {
        let f = fixture();
        let open = published("Open book", true);
        let secret = published("Closed book", false);
        let passed = evaluated("student", &open, 80.0);
        let hidden = evaluated("student", &secret, 95.0);
        save(&f.store, &[&open, &secret], &[&passed, &hidden]).await;
        f.notifications
            .notify(
                "student",
                NotificationPayload {
                    kind: NotificationKind::Exam,
                    title: "Result".into(),
                    message: "Evaluated".into(),
                    link: "/x".into(),
                },
            )
            .await
            .unwrap();

        let dashboard = f.reports.dashboard("student").await.unwrap();

        assert_eq!(dashboard.total_attempts, 2);
        assert_eq!(dashboard.evaluated_attempts, 1);
        assert_eq!(dashboard.passed, 1);
        assert_eq!(dashboard.highest_score, 80.0);
        assert_eq!(dashboard.unread_notifications, 1);
        assert_eq!(dashboard.open_exams.len(), 2);

        let secret_row = dashboard
            .recent_attempts
            .iter()
            .find(|r| r.exam_title == "Closed book")
            .unwrap();
        assert!(secret_row.attempt.score.is_none());
        assert!(secret_row.passed.is_none());
    }

    #[tokio::test]
    async fn overview_counts_results_and_totals() {
        let f = fixture();
        let exam = published("Finals", true);
        let pass = evaluated("a", &exam, 60.0);
        let fail = evaluated("b", &exam, 10.0);
        let running = ExamAttempt::begin("c", &exam, ClientInfo::default(), Utc::now());
        save(&f.store, &[&exam], &[&pass, &fail, &running]).await;
        {
            let mut tx = f.store.begin().await.unwrap();
            tx.insert_user(&User::test_user("a@example.com")).await.unwrap();
            tx.commit().await.unwrap();
        }

        let overview = f.reports.overview(None, None).await.unwrap();

        assert_eq!(overview.total_users, 1);
        assert_eq!(overview.total_exams, 1);
        assert_eq!(overview.total_attempts, 3);
        assert_eq!(
            overview.results,
            ResultsSummary {
                evaluated: 2,
                passed: 1,
                failed: 1,
                average_score: 35.0,
            }
        );
        assert!(overview.revenue.is_empty());
        let pass_row = overview
            .recent_attempts
            .iter()
            .find(|r| r.attempt_id == pass.id)
            .unwrap();
        assert_eq!(pass_row.score_percent, Some(60.0));
    }
}
