use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    auth::AuthenticatedUser,
    errors::AppError,
    handlers::attempt_handler::require_attempt_staff,
    models::dto::{
        request::{ReviewAnswerRequest, SubmitAnswerRequest},
        response::SubmittedAnswer,
    },
};

/// Creates or replaces the caller's answer to one question of their attempt.
#[post("/attempts/{attempt_id}/answers")]
pub async fn submit_answer(
    state: web::Data<Arc<AppState>>,
    attempt_id: web::Path<String>,
    request: web::Json<SubmitAnswerRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let SubmitAnswerRequest {
        question_id,
        answer,
    } = request.into_inner();

    let answer = state
        .answer_service
        .submit_answer(&attempt_id, &auth.0.sub, &question_id, answer)
        .await?;
    Ok(HttpResponse::Ok().json(SubmittedAnswer::from(answer)))
}

#[get("/attempts/{attempt_id}/answers")]
pub async fn list_answers(
    state: web::Data<Arc<AppState>>,
    attempt_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let (attempt, _) = state.attempt_service.get_attempt(&attempt_id).await?;
    require_attempt_staff(&state, &auth.0, &attempt).await?;

    let answers = state
        .answer_service
        .list_attempt_answers(&attempt_id)
        .await?;
    Ok(HttpResponse::Ok().json(answers))
}

#[post("/answers/{answer_id}/review")]
pub async fn review_answer(
    state: web::Data<Arc<AppState>>,
    answer_id: web::Path<String>,
    request: web::Json<ReviewAnswerRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    request.validate()?;

    let answer = state.answer_service.get_answer(&answer_id).await?;
    let (attempt, _) = state.attempt_service.get_attempt(&answer.attempt_id).await?;
    require_attempt_staff(&state, &auth.0, &attempt).await?;

    let answer = state
        .answer_service
        .review_answer(&answer_id, request.marks, request.feedback, &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(answer))
}
