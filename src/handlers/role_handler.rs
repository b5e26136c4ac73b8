use std::sync::Arc;

use actix_web::{delete, get, post, web, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    auth::{require_permission, AuthenticatedUser},
    errors::AppError,
    models::{
        domain::role::{permissions, WILDCARD_PERMISSION},
        dto::{
            request::CreateRoleRequest,
            response::{ApiResponse, MessageResponse},
        },
    },
};

#[get("/roles")]
pub async fn list_roles(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;
    Ok(HttpResponse::Ok().json(state.roles.list_roles().await))
}

#[post("/roles")]
pub async fn create_role(
    state: web::Data<Arc<AppState>>,
    request: web::Json<CreateRoleRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;

    let request = request.into_inner();
    request.validate()?;
    let role = state
        .roles
        .create_role(
            &request.name,
            &request.display_name,
            request.description.as_deref(),
            &request.permissions,
        )
        .await?;
    Ok(HttpResponse::Created().json(role))
}

#[delete("/roles/{name}")]
pub async fn delete_role(
    state: web::Data<Arc<AppState>>,
    name: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;

    state.roles.delete_role(&name).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(format!("Role '{}' deleted", name))))
}

/// Recreates the system role set; reserved for wildcard holders.
#[post("/roles/seed")]
pub async fn seed_roles(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, WILDCARD_PERMISSION).await?;

    let roles = state.roles.seed().await?;
    log::warn!("role set reseeded by '{}'", auth.0.sub);
    Ok(HttpResponse::Ok().json(ApiResponse::new(roles, "System roles seeded")))
}
