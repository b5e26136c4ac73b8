use std::sync::Arc;

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    auth::{require_any_permission, require_owner_or_permission, require_permission, AuthenticatedUser},
    errors::AppError,
    handlers::client_info,
    models::{
        domain::role::permissions,
        dto::{
            request::{
                CompletePaymentRequest, FailPaymentRequest, PaymentStatisticsQuery,
                RecordPaymentRequest, RefundRequest,
            },
            response::ApiResponse,
        },
    },
};

/// Registered ahead of `/payments/{payment_id}` so the literal segment wins.
#[get("/payments/statistics")]
pub async fn payment_statistics(
    state: web::Data<Arc<AppState>>,
    query: web::Query<PaymentStatisticsQuery>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_any_permission(
        &state.roles,
        &auth.0,
        &[permissions::MANAGE_PAYMENTS, permissions::VIEW_REPORTS],
    )
    .await?;

    let totals = state
        .payment_service
        .statistics(query.from, query.to)
        .await?;
    Ok(HttpResponse::Ok().json(totals))
}

#[post("/payments")]
pub async fn record_payment(
    state: web::Data<Arc<AppState>>,
    request: web::Json<RecordPaymentRequest>,
    auth: AuthenticatedUser,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let payment = state
        .payment_service
        .record_payment(&auth.0.sub, request.into_inner(), client_info(&req))
        .await?;
    Ok(HttpResponse::Created().json(payment))
}

#[get("/payments")]
pub async fn my_payments(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let payments = state
        .payment_service
        .list_user_payments(&auth.0.sub)
        .await?;
    Ok(HttpResponse::Ok().json(payments))
}

#[get("/payments/{payment_id}")]
pub async fn get_payment(
    state: web::Data<Arc<AppState>>,
    payment_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let payment = state.payment_service.get_payment(&payment_id).await?;
    require_owner_or_permission(
        &state.roles,
        &auth.0,
        &payment.user_id,
        permissions::MANAGE_PAYMENTS,
    )
    .await?;
    Ok(HttpResponse::Ok().json(payment))
}

#[post("/payments/{payment_id}/complete")]
pub async fn complete_payment(
    state: web::Data<Arc<AppState>>,
    payment_id: web::Path<String>,
    request: web::Json<CompletePaymentRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_PAYMENTS).await?;
    request.validate()?;

    let payment = state
        .payment_service
        .mark_completed(&payment_id, &request.transaction_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(payment, "Payment completed")))
}

#[post("/payments/{payment_id}/fail")]
pub async fn fail_payment(
    state: web::Data<Arc<AppState>>,
    payment_id: web::Path<String>,
    request: web::Json<FailPaymentRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_PAYMENTS).await?;
    request.validate()?;

    let payment = state
        .payment_service
        .mark_failed(&payment_id, &request.code, &request.message)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(payment, "Payment marked as failed")))
}

#[post("/payments/{payment_id}/refund")]
pub async fn refund_payment(
    state: web::Data<Arc<AppState>>,
    payment_id: web::Path<String>,
    request: web::Json<RefundRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::MANAGE_PAYMENTS).await?;

    let payment = state
        .payment_service
        .refund(&payment_id, request.reason.as_deref(), request.amount)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(payment, "Payment refunded")))
}
