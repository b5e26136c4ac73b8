pub mod account_service;
pub mod answer_service;
pub mod attempt_service;
pub mod attempt_sweeper;
pub mod catalog_service;
pub mod email;
pub mod file_store;
pub mod notification_service;
pub mod payment_service;
pub mod report_service;
pub mod role_registry;
pub mod user_service;

pub use account_service::AccountService;
pub use answer_service::AnswerService;
pub use attempt_service::AttemptService;
pub use catalog_service::CatalogService;
pub use notification_service::NotificationService;
pub use payment_service::PaymentService;
pub use report_service::ReportService;
pub use role_registry::RoleRegistry;
pub use user_service::UserService;
