pub mod answer_repository;
pub mod attempt_repository;
pub mod exam_repository;
pub mod notification_repository;
pub mod payment_repository;
pub mod question_repository;
pub mod role_repository;
pub mod user_repository;

pub use answer_repository::AnswerRepository;
pub use attempt_repository::AttemptRepository;
pub use exam_repository::{ExamFilter, ExamRepository};
pub use notification_repository::{
    InMemoryNotificationRepository, MongoNotificationRepository, NotificationRepository,
};
pub use payment_repository::PaymentRepository;
pub use question_repository::QuestionRepository;
pub use role_repository::RoleRepository;
pub use user_repository::UserRepository;

/// Slices one page out of an already sorted list.
pub(crate) fn page<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}
