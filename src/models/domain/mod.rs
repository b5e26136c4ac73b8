pub mod answer;
pub mod exam;
pub mod exam_attempt;
pub mod notification;
pub mod payment;
pub mod question;
pub mod role;
pub mod user;

pub use answer::{Answer, AnswerValue, ReviewStatus};
pub use exam::{Exam, ExamSettings};
pub use exam_attempt::{AttemptStatus, ClientInfo, ExamAttempt};
pub use notification::{Notification, NotificationKind, NotificationPayload};
pub use payment::{Payment, PaymentMethod, PaymentStatus, PaymentTarget};
pub use question::{Question, QuestionDraft, QuestionKind, QuestionType};
pub use role::Role;
pub use user::User;
