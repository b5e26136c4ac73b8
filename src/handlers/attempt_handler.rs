use std::sync::Arc;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};

use crate::{
    app_state::AppState,
    auth::{require_permission, AuthenticatedUser, Claims},
    errors::{AppError, AppResult},
    handlers::{client_info, exam_handler::require_exam_editor},
    models::{
        domain::{role::permissions, ExamAttempt},
        dto::response::{ApiResponse, AttemptDto},
    },
};

/// Grading staff for an attempt: the exam's author with `view_results`, or an exam manager.
pub(crate) async fn require_attempt_staff(
    state: &AppState,
    claims: &Claims,
    attempt: &ExamAttempt,
) -> AppResult<()> {
    let exam = state.catalog_service.get_exam(&attempt.exam_id).await?;
    require_exam_editor(state, claims, &exam, permissions::VIEW_RESULTS).await
}

#[post("/exams/{exam_id}/attempts")]
pub async fn start_attempt(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::TAKE_EXAM).await?;

    let attempt = state
        .attempt_service
        .start_attempt(&auth.0.sub, &exam_id, client_info(&req))
        .await?;
    Ok(HttpResponse::Created().json(AttemptDto::from_attempt(attempt, false)))
}

#[get("/attempts")]
pub async fn my_attempts(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let attempts = state.attempt_service.list_user_attempts(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(attempts))
}

#[get("/attempts/{attempt_id}")]
pub async fn get_attempt(
    state: web::Data<Arc<AppState>>,
    attempt_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let (attempt, show_result) = state.attempt_service.get_attempt(&attempt_id).await?;
    if attempt.user_id == auth.0.sub {
        return Ok(HttpResponse::Ok().json(AttemptDto::from_attempt(attempt, show_result)));
    }

    require_attempt_staff(&state, &auth.0, &attempt).await?;
    Ok(HttpResponse::Ok().json(attempt))
}

#[get("/attempts/{attempt_id}/questions")]
pub async fn attempt_questions(
    state: web::Data<Arc<AppState>>,
    attempt_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let questions = state
        .attempt_service
        .questions_for_attempt(&attempt_id, &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(questions))
}

#[post("/attempts/{attempt_id}/submit")]
pub async fn submit_attempt(
    state: web::Data<Arc<AppState>>,
    attempt_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let attempt = state
        .attempt_service
        .submit(&attempt_id, &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(
        AttemptDto::from_attempt(attempt, false),
        "Attempt submitted",
    )))
}

#[post("/attempts/{attempt_id}/evaluate")]
pub async fn evaluate_attempt(
    state: web::Data<Arc<AppState>>,
    attempt_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let (attempt, _) = state.attempt_service.get_attempt(&attempt_id).await?;
    require_attempt_staff(&state, &auth.0, &attempt).await?;

    let attempt = state.attempt_service.evaluate(&attempt_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(attempt, "Attempt evaluated")))
}

#[delete("/attempts/{attempt_id}")]
pub async fn drop_attempt(
    state: web::Data<Arc<AppState>>,
    attempt_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_EXAMS).await?;

    let attempt = state
        .attempt_service
        .drop_attempt(&attempt_id, &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(attempt, "Attempt dropped")))
}
