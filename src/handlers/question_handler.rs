use std::sync::Arc;

use actix_web::{delete, get, post, put, web, HttpResponse};

use crate::{
    app_state::AppState,
    auth::AuthenticatedUser,
    errors::AppError,
    handlers::exam_handler::{can_view_exam, require_exam_editor},
    models::{
        domain::{role::permissions, QuestionDraft},
        dto::request::ImageUploadQuery,
    },
};

/// Full question bodies, answers included; authoring view only.
#[get("/exams/{exam_id}/questions")]
pub async fn list_questions(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    if !can_view_exam(&state, &auth.0, &exam).await {
        return Err(AppError::NotFound(format!(
            "Exam with id '{}' not found",
            exam_id
        )));
    }
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_QUESTION).await?;

    let questions = state.catalog_service.list_questions(&exam_id).await?;
    Ok(HttpResponse::Ok().json(questions))
}

#[post("/exams/{exam_id}/questions")]
pub async fn add_question(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    draft: web::Json<QuestionDraft>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::CREATE_QUESTION).await?;

    let question = state
        .catalog_service
        .add_question(&exam_id, draft.into_inner(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Created().json(question))
}

#[put("/questions/{question_id}")]
pub async fn update_question(
    state: web::Data<Arc<AppState>>,
    question_id: web::Path<String>,
    draft: web::Json<QuestionDraft>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let question = state.catalog_service.get_question(&question_id).await?;
    let exam = state.catalog_service.get_exam(&question.exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_QUESTION).await?;

    let question = state
        .catalog_service
        .update_question(&question_id, draft.into_inner(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(question))
}

#[delete("/questions/{question_id}")]
pub async fn delete_question(
    state: web::Data<Arc<AppState>>,
    question_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let question = state.catalog_service.get_question(&question_id).await?;
    let exam = state.catalog_service.get_exam(&question.exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_QUESTION).await?;

    state
        .catalog_service
        .delete_question(&question_id, &auth.0.sub)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Raw image bytes in the body; the original file name in `?filename=`.
#[post("/questions/{question_id}/image")]
pub async fn upload_question_image(
    state: web::Data<Arc<AppState>>,
    question_id: web::Path<String>,
    query: web::Query<ImageUploadQuery>,
    body: web::Bytes,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let question = state.catalog_service.get_question(&question_id).await?;
    let exam = state.catalog_service.get_exam(&question.exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_QUESTION).await?;
    if body.is_empty() {
        return Err(AppError::ValidationError("Image body is empty".into()));
    }

    let question = state
        .catalog_service
        .set_question_image(&question_id, body.to_vec(), &query.filename, &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(question))
}
