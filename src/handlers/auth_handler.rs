use std::sync::Arc;

use actix_web::{get, post, put, web, HttpRequest, HttpResponse};

use crate::{
    app_state::AppState,
    auth::AuthenticatedUser,
    errors::AppError,
    handlers::client_info,
    models::dto::{
        request::{
            ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
            ResetPasswordRequest, UpdateProfileRequest,
        },
        response::{ApiResponse, MessageResponse},
    },
};

#[post("/auth/register")]
pub async fn register(
    state: web::Data<Arc<AppState>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let user = state.account_service.register(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(ApiResponse::new(
        user,
        "Registration successful. Check your email to verify your account.",
    )))
}

#[get("/auth/verify-email/{token}")]
pub async fn verify_email(
    state: web::Data<Arc<AppState>>,
    token: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let user = state
        .account_service
        .verify_email(&token, client_info(&req))
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(user, "Email verified")))
}

#[post("/auth/login")]
pub async fn login(
    state: web::Data<Arc<AppState>>,
    request: web::Json<LoginRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let response = state
        .account_service
        .login(request.into_inner(), client_info(&req))
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/auth/forgot-password")]
pub async fn forgot_password(
    state: web::Data<Arc<AppState>>,
    request: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    state
        .account_service
        .forgot_password(request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(
        "Password reset instructions have been sent to your email",
    )))
}

#[post("/auth/reset-password")]
pub async fn reset_password(
    state: web::Data<Arc<AppState>>,
    request: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    state
        .account_service
        .reset_password(request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password has been reset")))
}

#[post("/auth/logout")]
pub async fn logout(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    state
        .account_service
        .logout(&auth.0.sub, client_info(&req))
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Logged out")))
}

#[get("/me")]
pub async fn me(
    state: web::Data<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let profile = state.account_service.profile(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[put("/me")]
pub async fn update_me(
    state: web::Data<Arc<AppState>>,
    request: web::Json<UpdateProfileRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let profile = state
        .user_service
        .update_profile(&auth.0.sub, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[post("/me/password")]
pub async fn change_password(
    state: web::Data<Arc<AppState>>,
    request: web::Json<ChangePasswordRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    state
        .user_service
        .change_password(&auth.0.sub, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password changed")))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    use crate::{
        auth::password::hash_password,
        test_utils::fixtures::{bearer, signed_in, test_state},
    };

    #[actix_web::test]
    async fn test_profile_update_renames_the_caller() {
        let state = test_state().await;
        let (_, token) = signed_in(&state, "jane@example.com", "user").await;
        let app = crate::test_app!(state).await;

        let req = test::TestRequest::put()
            .uri("/api/me")
            .insert_header(bearer(&token))
            .set_json(json!({
                "name": "  Jane Q. Public ",
                "notification_preferences": { "email": false, "browser": true }
            }))
            .to_request();
        let profile: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(profile["name"], "Jane Q. Public");
        assert_eq!(profile["notification_preferences"]["email"], false);

        let req = test::TestRequest::put()
            .uri("/api/me")
            .insert_header(bearer(&token))
            .set_json(json!({ "name": "" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn test_password_change_requires_the_current_password() {
        let state = test_state().await;
        let (mut user, token) = signed_in(&state, "jane@example.com", "user").await;
        user.password_hash = hash_password("old-password").unwrap();
        let mut tx = state.store.begin().await.unwrap();
        tx.replace_user(&user).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);
        let app = crate::test_app!(state).await;

        let req = test::TestRequest::post()
            .uri("/api/me/password")
            .insert_header(bearer(&token))
            .set_json(json!({
                "current_password": "guessing-wrong",
                "new_password": "new-password-1"
            }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::post()
            .uri("/api/me/password")
            .insert_header(bearer(&token))
            .set_json(json!({
                "current_password": "old-password",
                "new_password": "new-password-1"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "email": "jane@example.com", "password": "new-password-1" }))
            .to_request();
        let login: Value = test::call_and_read_body_json(&app, req).await;
        assert!(login["access_token"].is_string());
    }
}
