use std::sync::Arc;

use actix_web::{delete, get, post, put, web, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    auth::{require_any_permission, require_permission, AuthenticatedUser, Claims},
    errors::{AppError, AppResult},
    models::{
        domain::{role::permissions, Exam},
        dto::{
            request::{ExamListQuery, ExamRequest, UnpublishRequest},
            response::{ApiResponse, PaginatedResponse},
        },
    },
    repositories::ExamFilter,
};

/// Managers may touch any exam; the author needs `capability` on their own.
pub(crate) async fn require_exam_editor(
    state: &AppState,
    claims: &Claims,
    exam: &Exam,
    capability: &str,
) -> AppResult<()> {
    if state.roles.role_can(&claims.role, permissions::MANAGE_EXAMS).await {
        return Ok(());
    }
    if exam.created_by != claims.sub {
        return Err(AppError::Forbidden(
            "Only the exam's author or an exam manager may change it".into(),
        ));
    }
    require_permission(&state.roles, claims, capability).await
}

/// Drafts are visible to their author and to exam managers only.
pub(crate) async fn can_view_exam(state: &AppState, claims: &Claims, exam: &Exam) -> bool {
    exam.is_published
        || exam.created_by == claims.sub
        || state.roles.role_can(&claims.role, permissions::MANAGE_EXAMS).await
}

#[get("/exams")]
pub async fn list_exams(
    state: web::Data<Arc<AppState>>,
    query: web::Query<ExamListQuery>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    query.validate()?;

    let mut filter = ExamFilter {
        published: query.published,
        created_by: query.created_by.clone(),
    };
    let own_listing = filter.created_by.as_deref() == Some(auth.0.sub.as_str());
    if !own_listing && !state.roles.role_can(&auth.0.role, permissions::MANAGE_EXAMS).await {
        filter.published = Some(true);
    }

    let pagination = query.pagination();
    let (items, total) = state.catalog_service.list_exams(filter, &pagination).await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items,
        total,
        offset: pagination.offset(),
        limit: pagination.limit(),
    }))
}

#[post("/exams")]
pub async fn create_exam(
    state: web::Data<Arc<AppState>>,
    request: web::Json<ExamRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_any_permission(
        &state.roles,
        &auth.0,
        &[permissions::CREATE_EXAM, permissions::MANAGE_EXAMS],
    )
    .await?;

    let request = request.into_inner();
    request.validate()?;
    let exam = state
        .catalog_service
        .create_exam(request.into(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Created().json(exam))
}

#[get("/exams/{exam_id}")]
pub async fn get_exam(
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
    Ok(HttpResponse::Ok().json(exam))
}

#[put("/exams/{exam_id}")]
pub async fn update_exam(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    request: web::Json<ExamRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_EXAM).await?;

    let request = request.into_inner();
    request.validate()?;
    let exam = state
        .catalog_service
        .update_exam(&exam_id, request.into(), &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(exam))
}

#[delete("/exams/{exam_id}")]
pub async fn delete_exam(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_EXAM).await?;

    state
        .catalog_service
        .delete_exam(&exam_id, &auth.0.sub)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/exams/{exam_id}/publish")]
pub async fn publish_exam(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_EXAM).await?;

    let exam = state.catalog_service.publish(&exam_id, &auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(exam, "Exam published")))
}

#[post("/exams/{exam_id}/unpublish")]
pub async fn unpublish_exam(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    request: Option<web::Json<UnpublishRequest>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::EDIT_EXAM).await?;

    let request = request.map(web::Json::into_inner).unwrap_or_default();
    request.validate()?;
    let exam = state
        .catalog_service
        .unpublish(&exam_id, request.reason, &auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(exam, "Exam unpublished")))
}

#[post("/exams/{exam_id}/duplicate")]
pub async fn duplicate_exam(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_any_permission(
        &state.roles,
        &auth.0,
        &[permissions::CREATE_EXAM, permissions::MANAGE_EXAMS],
    )
    .await?;
    let source = state.catalog_service.get_exam(&exam_id).await?;
    if !can_view_exam(&state, &auth.0, &source).await {
        return Err(AppError::NotFound(format!(
            "Exam with id '{}' not found",
            exam_id
        )));
    }

    let copy = state
        .catalog_service
        .duplicate(&exam_id, &auth.0.sub)
        .await?;
    Ok(HttpResponse::Created().json(copy))
}

#[post("/exams/{exam_id}/reconcile")]
pub async fn reconcile_exam(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_EXAMS).await?;

    let (exam, drifted) = state.catalog_service.reconcile_totals(&exam_id).await?;
    let message = if drifted {
        "Cached totals were out of date and have been repaired"
    } else {
        "Cached totals are consistent"
    };
    Ok(HttpResponse::Ok().json(ApiResponse::new(exam, message)))
}

#[get("/exams/{exam_id}/statistics")]
pub async fn exam_statistics(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::VIEW_RESULTS).await?;

    let statistics = state.catalog_service.exam_statistics(&exam_id).await?;
    Ok(HttpResponse::Ok().json(statistics))
}

#[get("/exams/{exam_id}/attempts")]
pub async fn exam_attempts(
    state: web::Data<Arc<AppState>>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let exam = state.catalog_service.get_exam(&exam_id).await?;
    require_exam_editor(&state, &auth.0, &exam, permissions::VIEW_RESULTS).await?;

    let attempts = state.attempt_service.list_exam_attempts(&exam_id).await?;
    Ok(HttpResponse::Ok().json(attempts))
}
