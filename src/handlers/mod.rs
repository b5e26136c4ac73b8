pub mod answer_handler;
pub mod attempt_handler;
pub mod auth_handler;
pub mod exam_handler;
pub mod health_handler;
pub mod notification_handler;
pub mod payment_handler;
pub mod question_handler;
pub mod report_handler;
pub mod role_handler;
pub mod user_handler;

use actix_web::{http::header::USER_AGENT, web, HttpRequest};

use crate::{auth::AuthMiddleware, models::domain::ClientInfo, services::file_store::MAX_UPLOAD_BYTES};

/// Caller address and user agent, as far as the connection reveals them.
pub fn client_info(req: &HttpRequest) -> ClientInfo {
    ClientInfo {
        ip_address: req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string),
        browser_info: req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Health checks and the unauthenticated account endpoints.
pub fn public_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_handler::health_check)
        .service(health_handler::health_check_live)
        .service(health_handler::health_check_ready)
        .service(auth_handler::register)
        .service(auth_handler::verify_email)
        .service(auth_handler::login)
        .service(auth_handler::forgot_password)
        .service(auth_handler::reset_password);
}

/// Everything under `/api`, behind the bearer-token middleware.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(AuthMiddleware)
            .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
            .service(auth_handler::logout)
            .service(auth_handler::me)
            .service(auth_handler::update_me)
            .service(auth_handler::change_password)
            .service(report_handler::dashboard)
            .service(report_handler::admin_overview)
            .service(user_handler::list_users)
            .service(user_handler::create_user)
            .service(user_handler::get_user)
            .service(user_handler::update_user)
            .service(user_handler::delete_user)
            .service(exam_handler::list_exams)
            .service(exam_handler::create_exam)
            .service(exam_handler::get_exam)
            .service(exam_handler::update_exam)
            .service(exam_handler::delete_exam)
            .service(exam_handler::publish_exam)
            .service(exam_handler::unpublish_exam)
            .service(exam_handler::duplicate_exam)
            .service(exam_handler::reconcile_exam)
            .service(exam_handler::exam_statistics)
            .service(exam_handler::exam_attempts)
            .service(question_handler::list_questions)
            .service(question_handler::add_question)
            .service(question_handler::update_question)
            .service(question_handler::delete_question)
            .service(question_handler::upload_question_image)
            .service(attempt_handler::start_attempt)
            .service(attempt_handler::my_attempts)
            .service(attempt_handler::get_attempt)
            .service(attempt_handler::attempt_questions)
            .service(attempt_handler::submit_attempt)
            .service(attempt_handler::evaluate_attempt)
            .service(attempt_handler::drop_attempt)
            .service(answer_handler::submit_answer)
            .service(answer_handler::list_answers)
            .service(answer_handler::review_answer)
            .service(notification_handler::list_notifications)
            .service(notification_handler::unread_count)
            .service(notification_handler::mark_all_read)
            .service(notification_handler::mark_read)
            .service(notification_handler::delete_notification)
            .service(notification_handler::broadcast)
            .service(payment_handler::payment_statistics)
            .service(payment_handler::record_payment)
            .service(payment_handler::my_payments)
            .service(payment_handler::get_payment)
            .service(payment_handler::complete_payment)
            .service(payment_handler::fail_payment)
            .service(payment_handler::refund_payment)
            .service(role_handler::list_roles)
            .service(role_handler::create_role)
            .service(role_handler::delete_role)
            .service(role_handler::seed_roles),
    );
}
