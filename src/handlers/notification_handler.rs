use std::sync::Arc;

use actix_web::{delete, get, post, web, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    auth::{require_permission, AuthenticatedUser},
    errors::AppError,
    models::{
        domain::role::permissions,
        dto::{
            request::BroadcastRequest,
            response::{BroadcastResult, MessageResponse, UnreadCount},
        },
    },
};

#[get("/notifications")]
pub async fn list_notifications(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let notifications = state
        .notification_service
        .list_for_user(&auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(notifications))
}

#[get("/notifications/unread-count")]
pub async fn unread_count(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let unread = state
        .notification_service
        .unread_count(&auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(UnreadCount { unread }))
}

#[post("/notifications/read-all")]
pub async fn mark_all_read(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let updated = state
        .notification_service
        .mark_all_read(&auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(format!(
        "{} notifications marked as read",
        updated
    ))))
}

#[post("/notifications/{notification_id}/read")]
pub async fn mark_read(
    state: web::Data<Arc<AppState>>,
    notification_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    state
        .notification_service
        .mark_read(&auth.0.sub, &notification_id)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Notification marked as read")))
}

#[delete("/notifications/{notification_id}")]
pub async fn delete_notification(
    state: web::Data<Arc<AppState>>,
    notification_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    state
        .notification_service
        .delete(&auth.0.sub, &notification_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/notifications/broadcast")]
pub async fn broadcast(
    state: web::Data<Arc<AppState>>,
    request: web::Json<BroadcastRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_USERS).await?;

    let request = request.into_inner();
    request.validate()?;
    let report = state
        .notification_service
        .notify_many(&request.user_ids, &request.notification)
        .await;
    log::info!(
        "broadcast by '{}': {} delivered, {} failed",
        auth.0.sub,
        report.delivered,
        report.failed
    );
    Ok(HttpResponse::Ok().json(BroadcastResult {
        delivered: report.delivered,
        failed: report.failed,
    }))
}
