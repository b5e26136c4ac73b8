use std::sync::Arc;

use actix_web::{delete, get, post, put, web, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    auth::{require_permission, AuthenticatedUser},
    errors::AppError,
    models::{
        domain::role::permissions,
        dto::{
            request::{CreateUserRequest, PaginationParams, UpdateUserRequest},
            response::PaginatedResponse,
        },
    },
};

#[get("/users")]
pub async fn list_users(
    state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationParams>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;
    query.validate()?;

    let (items, total) = state.user_service.list_users(&query).await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items,
        total,
        offset: query.offset(),
        limit: query.limit(),
    }))
}

#[post("/users")]
pub async fn create_user(
    state: web::Data<Arc<AppState>>,
    request: web::Json<CreateUserRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;

    let user = state
        .user_service
        .create_user(&auth.0, request.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(user))
}

#[get("/users/{user_id}")]
pub async fn get_user(
    state: web::Data<Arc<AppState>>,
    user_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;

    let user = state.user_service.get_user(&user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Changes name, role or active flag; fields left out stay as they are.
#[put("/users/{user_id}")]
pub async fn update_user(
    state: web::Data<Arc<AppState>>,
    user_id: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;

    let user = state
        .user_service
        .update_user(&auth.0, &user_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/users/{user_id}")]
pub async fn delete_user(
    state: web::Data<Arc<AppState>>,
    user_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;

    state.user_service.delete_user(&auth.0, &user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
