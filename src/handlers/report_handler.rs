use std::sync::Arc;

use actix_web::{get, web, HttpResponse};

use crate::{
    app_state::AppState,
    auth::{require_permission, AuthenticatedUser},
    errors::AppError,
    models::{domain::role::permissions, dto::request::OverviewQuery},
};

/// The caller's own attempt history, open exams and unread count.
#[get("/dashboard")]
pub async fn dashboard(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let dashboard = state.report_service.dashboard(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}

#[get("/admin/overview")]
pub async fn admin_overview(
    state: web::Data<Arc<AppState>>,
    query: web::Query<OverviewQuery>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_permission(&state.roles, &auth.0, permissions::VIEW_REPORTS).await?;

    let query = query.into_inner();
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::ValidationError(
                "'from' must not be after 'to'".into(),
            ));
        }
    }
    let overview = state.report_service.overview(query.from, query.to).await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    use crate::test_utils::fixtures::{bearer, signed_in, test_state};

    #[actix_web::test]
    async fn test_new_student_dashboard_is_empty() {
        let state = test_state().await;
        let (_, token) = signed_in(&state, "student@example.com", "user").await;
        let app = crate::test_app!(state).await;

        let req = test::TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(bearer(&token))
            .to_request();
        let dashboard: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(dashboard["total_attempts"], 0);
        assert_eq!(dashboard["unread_notifications"], 0);
        assert!(dashboard["recent_attempts"].as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_overview_is_reserved_for_report_viewers() {
        let state = test_state().await;
        let (_, student) = signed_in(&state, "student@example.com", "user").await;
        let (_, admin) = signed_in(&state, "admin@example.com", "admin").await;
        let app = crate::test_app!(state).await;

        let req = test::TestRequest::get()
            .uri("/api/admin/overview")
            .insert_header(bearer(&student))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        let req = test::TestRequest::get()
            .uri("/api/admin/overview")
            .insert_header(bearer(&admin))
            .to_request();
        let overview: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(overview["total_users"], 2);
        assert_eq!(overview["results"]["evaluated"], 0);
    }

    #[actix_web::test]
    async fn test_overview_rejects_inverted_range() {
        let state = test_state().await;
        let (_, admin) = signed_in(&state, "admin@example.com", "admin").await;
        let app = crate::test_app!(state).await;

        let req = test::TestRequest::get()
            .uri("/api/admin/overview?from=2026-02-01T00:00:00Z&to=2026-01-01T00:00:00Z")
            .insert_header(bearer(&admin))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }
}
