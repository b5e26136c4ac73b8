use std::sync::Arc;

use chrono::{Duration, Utc};
use validator::Validate;

use crate::{
    auth::{
        password::{generate_token, hash_password, hash_token, verify_password},
        Claims, JwtService,
    },
    db::{finish, Store, Transaction},
    errors::{AppError, AppResult},
    models::{
        domain::{
            role::DEFAULT_USER_ROLE,
            user::{ActivityEvent, LoginEvent, LoginStatus, TokenDigest},
            ClientInfo, User,
        },
        dto::{
            request::{
                ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
            },
            response::{AuthResponse, UserDto},
        },
    },
    services::{
        email::{
            EmailMessage, EmailSender, TEMPLATE_RESET_PASSWORD, TEMPLATE_VERIFY_EMAIL,
            TEMPLATE_WELCOME,
        },
        role_registry::RoleRegistry,
    },
};

const VERIFICATION_TTL_HOURS: i64 = 24;
const RESET_TTL_MINUTES: i64 = 30;

enum LoginOutcome {
    Success(User),
    WrongPassword,
}

pub struct AccountService {
    store: Arc<dyn Store>,
    roles: Arc<RoleRegistry>,
    email: Arc<dyn EmailSender>,
    jwt: JwtService,
    app_base_url: String,
    history_retention: Duration,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn Store>,
        roles: Arc<RoleRegistry>,
        email: Arc<dyn EmailSender>,
        jwt: JwtService,
        app_base_url: &str,
        history_retention_days: i64,
    ) -> Self {
        Self {
            store,
            roles,
            email,
            jwt,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
            history_retention: Duration::days(history_retention_days),
        }
    }

    /// Creates an unverified account and emails its verification link. The
    /// account is rolled back when the email cannot be sent.
    pub async fn register(&self, request: RegisterRequest) -> AppResult<UserDto> {
        request.validate()?;

        self.roles.resolve_role(DEFAULT_USER_ROLE).await.map_err(|_| {
            AppError::InternalError(format!(
                "Default role '{}' is missing; seed the roles first",
                DEFAULT_USER_ROLE
            ))
        })?;

        let password_hash = hash_password(&request.password)?;
        let token = generate_token();
        let mut user = User::new(&request.name, &request.email, &password_hash);
        user.email_verification = Some(TokenDigest {
            hash: hash_token(&token),
            expires_at: Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS),
        });

        let mut tx = self.store.begin().await?;
        let outcome = self.register_in(tx.as_mut(), &user, &token).await;
        finish(tx, outcome).await?;

        log::info!("registered user '{}'", user.id);
        Ok(user.into())
    }

    async fn register_in(&self, tx: &mut dyn Transaction, user: &User, token: &str) -> AppResult<()> {
        if tx.find_user_by_email(&user.email).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "Email is already registered".to_string(),
            ));
        }
        tx.insert_user(user).await?;

        let message = EmailMessage::new(
            &user.email,
            TEMPLATE_VERIFY_EMAIL,
            serde_json::json!({
                "name": user.name,
                "verification_url": format!("{}/auth/verify-email/{}", self.app_base_url, token),
                "expires_in": format!("{} hours", VERIFICATION_TTL_HOURS),
            }),
        );
        self.email.send(message).await
    }

    pub async fn verify_email(&self, token: &str, client: ClientInfo) -> AppResult<UserDto> {
        let mut tx = self.store.begin().await?;
        let outcome = self.verify_in(tx.as_mut(), token, client).await;
        let user = finish(tx, outcome).await?;

        let welcome = EmailMessage::new(
            &user.email,
            TEMPLATE_WELCOME,
            serde_json::json!({ "name": user.name }),
        );
        if let Err(e) = self.email.send(welcome).await {
            log::warn!("welcome email to user '{}' failed: {}", user.id, e);
        }

        Ok(user.into())
    }

    async fn verify_in(
        &self,
        tx: &mut dyn Transaction,
        token: &str,
        client: ClientInfo,
    ) -> AppResult<User> {
        let now = Utc::now();
        let invalid = || AppError::ValidationError("Invalid or expired verification token".into());

        let mut user = tx
            .find_user_by_verification_hash(&hash_token(token))
            .await?
            .ok_or_else(invalid)?;
        if user
            .email_verification
            .as_ref()
            .map_or(true, |t| t.is_expired(now))
        {
            return Err(invalid());
        }

        user.email_verified = true;
        user.verified_at = Some(now);
        user.email_verification = None;
        user.verification_history.push(ActivityEvent {
            timestamp: now,
            ip: client.ip_address,
            user_agent: client.browser_info,
        });
        user.prune_history(now, self.history_retention);
        user.touch();
        tx.replace_user(&user).await?;
        Ok(user)
    }

    pub async fn login(&self, request: LoginRequest, client: ClientInfo) -> AppResult<AuthResponse> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = self.login_in(tx.as_mut(), &request, client).await;
        // A wrong password still commits, so the failed attempt stays on record.
        let user = match finish(tx, outcome).await? {
            LoginOutcome::Success(user) => user,
            LoginOutcome::WrongPassword => {
                return Err(AppError::Unauthorized("Invalid email or password".into()))
            }
        };

        let access_token = self.jwt.create_token(&user)?;
        log::info!("user '{}' logged in", user.id);
        Ok(AuthResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.expires_in_secs(),
            user: user.into(),
        })
    }

    async fn login_in(
        &self,
        tx: &mut dyn Transaction,
        request: &LoginRequest,
        client: ClientInfo,
    ) -> AppResult<LoginOutcome> {
        let now = Utc::now();
        let mut user = tx
            .find_user_by_email(&request.email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

        let matches = verify_password(&request.password, &user.password_hash)?;
        user.login_history.push(LoginEvent {
            timestamp: now,
            ip: client.ip_address,
            user_agent: client.browser_info,
            status: if matches {
                LoginStatus::Success
            } else {
                LoginStatus::Failed
            },
        });
        user.prune_history(now, self.history_retention);

        if !matches {
            user.touch();
            tx.replace_user(&user).await?;
            return Ok(LoginOutcome::WrongPassword);
        }
        if !user.is_active {
            return Err(AppError::Forbidden("Account is deactivated".into()));
        }
        if !user.email_verified {
            return Err(AppError::Forbidden(
                "Please verify your email before logging in".into(),
            ));
        }

        user.last_login = Some(now);
        user.touch();
        tx.replace_user(&user).await?;
        Ok(LoginOutcome::Success(user))
    }

    pub async fn logout(&self, user_id: &str, client: ClientInfo) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = self.logout_in(tx.as_mut(), user_id, client).await;
        finish(tx, outcome).await
    }

    async fn logout_in(
        &self,
        tx: &mut dyn Transaction,
        user_id: &str,
        client: ClientInfo,
    ) -> AppResult<()> {
        let now = Utc::now();
        let mut user = self.load_user(tx, user_id).await?;
        user.logout_history.push(ActivityEvent {
            timestamp: now,
            ip: client.ip_address,
            user_agent: client.browser_info,
        });
        user.prune_history(now, self.history_retention);
        user.touch();
        tx.replace_user(&user).await
    }

    /// Issues a 30 minute reset token unless an unexpired one is outstanding.
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> AppResult<()> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = self.forgot_in(tx.as_mut(), &request.email).await;
        finish(tx, outcome).await
    }

    async fn forgot_in(&self, tx: &mut dyn Transaction, email: &str) -> AppResult<()> {
        let now = Utc::now();
        let mut user = tx
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        if let Some(existing) = user.password_reset.as_ref().filter(|t| !t.is_expired(now)) {
            let wait = (existing.expires_at - now).num_minutes() + 1;
            return Err(AppError::ValidationError(format!(
                "Please wait {} minutes before requesting another reset",
                wait
            )));
        }

        let token = generate_token();
        user.password_reset = Some(TokenDigest {
            hash: hash_token(&token),
            expires_at: now + Duration::minutes(RESET_TTL_MINUTES),
        });
        user.touch();
        tx.replace_user(&user).await?;

        let message = EmailMessage::new(
            &user.email,
            TEMPLATE_RESET_PASSWORD,
            serde_json::json!({
                "name": user.name,
                "reset_url": format!("{}/auth/reset-password/{}", self.app_base_url, token),
                "expires_in": format!("{} minutes", RESET_TTL_MINUTES),
            }),
        );
        self.email.send(message).await
    }

    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AppResult<()> {
        request.validate()?;
        let password_hash = hash_password(&request.password)?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::reset_in(tx.as_mut(), &request.token, password_hash).await;
        let user_id = finish(tx, outcome).await?;

        log::info!("password reset for user '{}'", user_id);
        Ok(())
    }

    async fn reset_in(
        tx: &mut dyn Transaction,
        token: &str,
        password_hash: String,
    ) -> AppResult<String> {
        let now = Utc::now();
        let invalid = || AppError::ValidationError("Invalid or expired reset token".into());

        let mut user = tx
            .find_user_by_reset_hash(&hash_token(token))
            .await?
            .ok_or_else(invalid)?;
        if user
            .password_reset
            .as_ref()
            .map_or(true, |t| t.is_expired(now))
        {
            return Err(invalid());
        }

        user.password_hash = password_hash;
        user.password_reset = None;
        user.touch();
        tx.replace_user(&user).await?;
        Ok(user.id)
    }

    /// Re-reads the account behind a token. Deleted and deactivated accounts
    /// are rejected, and the role is taken from the stored account so role
    /// changes apply to tokens already issued.
    pub async fn check_session(&self, mut claims: Claims) -> AppResult<Claims> {
        let mut tx = self.store.begin().await?;
        let outcome = tx.find_user_by_id(&claims.sub).await;
        let user = finish(tx, outcome)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;

        if !user.is_active {
            return Err(AppError::Unauthorized("Account is deactivated".into()));
        }
        claims.role = user.role;
        Ok(claims)
    }

    pub async fn profile(&self, user_id: &str) -> AppResult<UserDto> {
        let mut tx = self.store.begin().await?;
        let outcome = self.load_user(tx.as_mut(), user_id).await;
        finish(tx, outcome).await.map(UserDto::from)
    }

    async fn load_user(&self, tx: &mut dyn Transaction, user_id: &str) -> AppResult<User> {
        tx.find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id '{}' not found", user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::MemoryStore;
    use crate::services::email::MockEmailSender;
    use std::sync::Mutex;

    struct Harness {
        service: AccountService,
        store: Arc<MemoryStore>,
    }

    async fn harness(email: MockEmailSender) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let roles = Arc::new(RoleRegistry::new(store.clone()));
        roles.seed().await.unwrap();
        let service = AccountService::new(
            store.clone(),
            roles,
            Arc::new(email),
            JwtService::new(&Config::test_config().jwt_secret, 1),
            "http://portal.test",
            90,
        );
        Harness { service, store }
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Jane".into(),
            email: email.into(),
            password: "a long password".into(),
        }
    }

    /// Captures the raw token out of the last email carrying `field`.
    fn capturing_sender(field: &'static str, sink: Arc<Mutex<Option<String>>>) -> MockEmailSender {
        let mut email = MockEmailSender::new();
        email.expect_send().returning(move |message| {
            if let Some(url) = message.data.get(field).and_then(|v| v.as_str()) {
                let token = url.rsplit('/').next().unwrap_or_default().to_string();
                *sink.lock().unwrap() = Some(token);
            }
            Ok(())
        });
        email
    }

    async fn find_user(store: &MemoryStore, email: &str) -> Option<User> {
        let mut tx = store.begin().await.unwrap();
        tx.find_user_by_email(email).await.unwrap()
    }

    #[tokio::test]
    async fn registration_is_rolled_back_when_email_fails() {
        let mut email = MockEmailSender::new();
        email
            .expect_send()
            .times(1)
            .returning(|_| Err(AppError::DependencyFailure("relay down".into())));
        let h = harness(email).await;

        let err = h
            .service
            .register(register_request("jane@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DependencyFailure(_)));
        assert!(find_user(&h.store, "jane@example.com").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let mut email = MockEmailSender::new();
        email.expect_send().times(1).returning(|_| Ok(()));
        let h = harness(email).await;

        h.service
            .register(register_request("jane@example.com"))
            .await
            .unwrap();
        let err = h
            .service
            .register(register_request("JANE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn unverified_users_cannot_log_in_until_verified() {
        let token = Arc::new(Mutex::new(None));
        let h = harness(capturing_sender("verification_url", token.clone())).await;

        h.service
            .register(register_request("jane@example.com"))
            .await
            .unwrap();

        let login = LoginRequest {
            email: "jane@example.com".into(),
            password: "a long password".into(),
        };
        let err = h
            .service
            .login(login.clone(), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let raw = token.lock().unwrap().clone().unwrap();
        let user = h
            .service
            .verify_email(&raw, ClientInfo::default())
            .await
            .unwrap();
        assert!(user.email_verified);

        // Single use.
        assert!(h
            .service
            .verify_email(&raw, ClientInfo::default())
            .await
            .is_err());

        let auth = h.service.login(login, ClientInfo::default()).await.unwrap();
        assert_eq!(auth.token_type, "Bearer");
        assert!(!auth.access_token.is_empty());
    }

    #[tokio::test]
    async fn wrong_password_is_recorded_in_history() {
        let mut email = MockEmailSender::new();
        email.expect_send().returning(|_| Ok(()));
        let h = harness(email).await;
        h.service
            .register(register_request("jane@example.com"))
            .await
            .unwrap();

        let err = h
            .service
            .login(
                LoginRequest {
                    email: "jane@example.com".into(),
                    password: "not the password".into(),
                },
                ClientInfo {
                    ip_address: Some("10.0.0.1".into()),
                    browser_info: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let user = find_user(&h.store, "jane@example.com").await.unwrap();
        assert_eq!(user.login_history.len(), 1);
        assert_eq!(user.login_history[0].status, LoginStatus::Failed);
        assert_eq!(user.login_history[0].ip.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let token = Arc::new(Mutex::new(None));
        let h = harness(capturing_sender("reset_url", token.clone())).await;
        h.service
            .register(register_request("jane@example.com"))
            .await
            .unwrap();

        let request = ForgotPasswordRequest {
            email: "jane@example.com".into(),
        };
        h.service.forgot_password(request.clone()).await.unwrap();

        let err = h.service.forgot_password(request).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let raw = token.lock().unwrap().clone().unwrap();
        h.service
            .reset_password(ResetPasswordRequest {
                token: raw.clone(),
                password: "a brand new password".into(),
            })
            .await
            .unwrap();

        let user = find_user(&h.store, "jane@example.com").await.unwrap();
        assert!(user.password_reset.is_none());
        assert!(verify_password("a brand new password", &user.password_hash).unwrap());

        let reused = h
            .service
            .reset_password(ResetPasswordRequest {
                token: raw,
                password: "yet another password".into(),
            })
            .await;
        assert!(reused.is_err());
    }

    #[tokio::test]
    async fn sessions_follow_the_stored_account() {
        let h = harness(MockEmailSender::new()).await;
        let mut user = User::test_user("jane@example.com");
        user.email_verified = true;
        {
            let mut tx = h.store.begin().await.unwrap();
            tx.insert_user(&user).await.unwrap();
            tx.commit().await.unwrap();
        }
        let claims = Claims::new(&user, 1);

        user.role = "instructor".into();
        {
            let mut tx = h.store.begin().await.unwrap();
            tx.replace_user(&user).await.unwrap();
            tx.commit().await.unwrap();
        }
        let refreshed = h.service.check_session(claims.clone()).await.unwrap();
        assert_eq!(refreshed.role, "instructor");

        user.is_active = false;
        {
            let mut tx = h.store.begin().await.unwrap();
            tx.replace_user(&user).await.unwrap();
            tx.commit().await.unwrap();
        }
        assert!(matches!(
            h.service.check_session(claims.clone()).await,
            Err(AppError::Unauthorized(_))
        ));

        {
            let mut tx = h.store.begin().await.unwrap();
            tx.delete_user(&user.id).await.unwrap();
            tx.commit().await.unwrap();
        }
        assert!(matches!(
            h.service.check_session(claims).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email() {
        let h = harness(MockEmailSender::new()).await;
        let err = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "nobody@example.com".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
