use std::sync::Arc;

use crate::{
    app_state::AppState,
    config::Config,
    models::domain::User,
};

#[cfg(test)]
pub mod fixtures {
    use super::*;

    /// In-memory application state with the system roles seeded.
    pub async fn test_state() -> Arc<AppState> {
        Arc::new(
            AppState::in_memory(Config::test_config())
                .await
                .expect("in-memory state should build"),
        )
    }

    /// Stores a verified, active user with the given role and returns it with a bearer token.
    pub async fn signed_in(state: &AppState, email: &str, role: &str) -> (User, String) {
        let mut user = User::test_user(email);
        user.role = role.to_string();
        user.email_verified = true;

        let mut tx = state.store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();

        let token = state.jwt_service.create_token(&user).unwrap();
        (user, token)
    }

    pub fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }
}

#[cfg(test)]
pub mod test_helpers {
    use actix_web::http::StatusCode;

    /// Asserts that a status code represents an error (4xx or 5xx)
    pub fn assert_error_status(status: StatusCode) {
        assert!(
            status.is_client_error() || status.is_server_error(),
            "Expected error status, got: {}",
            status
        );
    }

    /// Asserts that a status code represents success (2xx)
    pub fn assert_success_status(status: StatusCode) {
        assert!(
            status.is_success(),
            "Expected success status, got: {}",
            status
        );
    }
}

/// Builds the full service the way `main` does, minus CORS and logging.
#[cfg(test)]
#[macro_export]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.clone()))
                .app_data(actix_web::web::Data::new($state.jwt_service.clone()))
                .configure($crate::handlers::public_routes)
                .configure($crate::handlers::api_routes),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;

    #[tokio::test]
    async fn test_signed_in_user_round_trips_through_jwt() {
        let state = test_state().await;
        let (user, token) = signed_in(&state, "ada@example.com", "instructor").await;

        let claims = state.jwt_service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, "instructor");
    }
}
