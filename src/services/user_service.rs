use std::sync::Arc;

use validator::Validate;

use crate::{
    auth::{
        password::{hash_password, verify_password},
        Claims,
    },
    db::{finish, Store, Transaction},
    errors::{AppError, AppResult},
    models::{
        domain::{
            role::{normalize_role_name, Role, WILDCARD_PERMISSION},
            User,
        },
        dto::{
            request::{
                ChangePasswordRequest, CreateUserRequest, PaginationParams, UpdateProfileRequest,
                UpdateUserRequest,
            },
            response::UserDto,
        },
    },
    services::role_registry::RoleRegistry,
};

async fn load_user(tx: &mut dyn Transaction, user_id: &str) -> AppResult<User> {
    tx.find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id '{}' not found", user_id)))
}

fn grants_everything(role: &Role) -> bool {
    role.permissions.iter().any(|p| p == WILDCARD_PERMISSION)
}

/// Only wildcard holders may hand out, or act on accounts holding, the wildcard.
fn ensure_covers(actor: &Role, target: &Role) -> AppResult<()> {
    if grants_everything(target) && !grants_everything(actor) {
        return Err(AppError::Forbidden(format!(
            "Role '{}' cannot manage accounts with role '{}'",
            actor.name, target.name
        )));
    }
    Ok(())
}

/// Account administration and self-service profile changes.
pub struct UserService {
    store: Arc<dyn Store>,
    roles: Arc<RoleRegistry>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, roles: Arc<RoleRegistry>) -> Self {
        Self { store, roles }
    }

    pub async fn list_users(&self, pagination: &PaginationParams) -> AppResult<(Vec<UserDto>, i64)> {
        let mut tx = self.store.begin().await?;
        let outcome = tx.list_users(pagination.offset(), pagination.limit()).await;
        let (users, total) = finish(tx, outcome).await?;
        Ok((users.into_iter().map(UserDto::from).collect(), total))
    }

    pub async fn get_user(&self, user_id: &str) -> AppResult<UserDto> {
        let mut tx = self.store.begin().await?;
        let outcome = load_user(tx.as_mut(), user_id).await;
        finish(tx, outcome).await.map(UserDto::from)
    }

    pub async fn create_user(&self, actor: &Claims, request: CreateUserRequest) -> AppResult<UserDto> {
        request.validate()?;
        let role = self.grantable_role(actor, &request.role).await?;

        let password_hash = hash_password(&request.password)?;
        let mut user = User::new(&request.name, &request.email, &password_hash);
        user.role = role.name;
        user.is_active = request.is_active;
        user.email_verified = true;
        user.verified_at = user.created_at;

        let mut tx = self.store.begin().await?;
        let outcome = Self::create_in(tx.as_mut(), &user).await;
        finish(tx, outcome).await?;

        log::info!("user '{}' created by '{}' as '{}'", user.id, actor.sub, user.role);
        Ok(user.into())
    }

    async fn create_in(tx: &mut dyn Transaction, user: &User) -> AppResult<()> {
        if tx.find_user_by_email(&user.email).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "Email is already registered".to_string(),
            ));
        }
        tx.insert_user(user).await
    }

    /// Renames, reassigns the role of, or (de)activates another account.
    pub async fn update_user(
        &self,
        actor: &Claims,
        user_id: &str,
        request: UpdateUserRequest,
    ) -> AppResult<UserDto> {
        request.validate()?;
        if actor.sub == user_id && (request.role.is_some() || request.is_active == Some(false)) {
            return Err(AppError::Forbidden(
                "You cannot change your own role or deactivate yourself".into(),
            ));
        }
        let new_role = match &request.role {
            Some(name) => Some(self.grantable_role(actor, name).await?),
            None => None,
        };

        let mut tx = self.store.begin().await?;
        let outcome = self
            .update_in(tx.as_mut(), actor, user_id, request, new_role)
            .await;
        let user = finish(tx, outcome).await?;

        log::info!(
            "user '{}' updated by '{}' (role '{}', active {})",
            user.id,
            actor.sub,
            user.role,
            user.is_active
        );
        Ok(user.into())
    }

    async fn update_in(
        &self,
        tx: &mut dyn Transaction,
        actor: &Claims,
        user_id: &str,
        request: UpdateUserRequest,
        new_role: Option<Role>,
    ) -> AppResult<User> {
        let mut user = load_user(tx, user_id).await?;
        self.ensure_manageable(actor, &user).await?;

        if let Some(name) = request.name {
            user.name = name.trim().to_string();
        }
        if let Some(role) = new_role {
            user.role = role.name;
        }
        if let Some(active) = request.is_active {
            user.is_active = active;
        }
        user.touch();
        tx.replace_user(&user).await?;
        Ok(user)
    }

    pub async fn delete_user(&self, actor: &Claims, user_id: &str) -> AppResult<()> {
        if actor.sub == user_id {
            return Err(AppError::Forbidden("You cannot delete your own account".into()));
        }

        let mut tx = self.store.begin().await?;
        let outcome = self.delete_in(tx.as_mut(), actor, user_id).await;
        finish(tx, outcome).await?;

        log::info!("user '{}' deleted by '{}'", user_id, actor.sub);
        Ok(())
    }

    async fn delete_in(&self, tx: &mut dyn Transaction, actor: &Claims, user_id: &str) -> AppResult<()> {
        let user = load_user(tx, user_id).await?;
        self.ensure_manageable(actor, &user).await?;
        tx.delete_user(user_id).await
    }

    /// Gives an existing account `role_name`, activating and verifying it.
    /// Used to bootstrap the first administrator from the command line.
    pub async fn promote_by_email(&self, email: &str, role_name: &str) -> AppResult<UserDto> {
        let role = self.roles.resolve_role(role_name).await?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::promote_in(tx.as_mut(), email, &role).await;
        let user = finish(tx, outcome).await?;

        log::info!("user '{}' promoted to '{}'", user.id, user.role);
        Ok(user.into())
    }

    async fn promote_in(tx: &mut dyn Transaction, email: &str, role: &Role) -> AppResult<User> {
        let mut user = tx
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No account registered for '{}'", email)))?;

        user.role = role.name.clone();
        user.is_active = true;
        if !user.email_verified {
            user.email_verified = true;
            user.verified_at = Some(chrono::Utc::now());
            user.email_verification = None;
        }
        user.touch();
        tx.replace_user(&user).await?;
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        request: UpdateProfileRequest,
    ) -> AppResult<UserDto> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = Self::profile_in(tx.as_mut(), user_id, request).await;
        finish(tx, outcome).await.map(UserDto::from)
    }

    async fn profile_in(
        tx: &mut dyn Transaction,
        user_id: &str,
        request: UpdateProfileRequest,
    ) -> AppResult<User> {
        let mut user = load_user(tx, user_id).await?;
        user.name = request.name.trim().to_string();
        if let Some(preferences) = request.notification_preferences {
            user.notification_preferences = preferences;
        }
        user.touch();
        tx.replace_user(&user).await?;
        Ok(user)
    }

    /// Replaces the password after checking the current one. Any outstanding
    /// reset token is discarded.
    pub async fn change_password(
        &self,
        user_id: &str,
        request: ChangePasswordRequest,
    ) -> AppResult<()> {
        request.validate()?;
        let password_hash = hash_password(&request.new_password)?;

        let mut tx = self.store.begin().await?;
        let outcome =
            Self::password_in(tx.as_mut(), user_id, &request.current_password, password_hash).await;
        finish(tx, outcome).await?;

        log::info!("password changed for user '{}'", user_id);
        Ok(())
    }

    async fn password_in(
        tx: &mut dyn Transaction,
        user_id: &str,
        current_password: &str,
        password_hash: String,
    ) -> AppResult<()> {
        let mut user = load_user(tx, user_id).await?;
        if !verify_password(current_password, &user.password_hash)? {
            return Err(AppError::ValidationError(
                "Current password is incorrect".into(),
            ));
        }

        user.password_hash = password_hash;
        user.password_reset = None;
        user.touch();
        tx.replace_user(&user).await
    }

    async fn grantable_role(&self, actor: &Claims, name: &str) -> AppResult<Role> {
        let target = self
            .roles
            .resolve_role(name)
            .await
            .map_err(|_| AppError::ValidationError(format!("Unknown role '{}'", normalize_role_name(name))))?;
        let actor_role = self.roles.resolve_role(&actor.role).await?;
        ensure_covers(&actor_role, &target)?;
        Ok(target)
    }

    async fn ensure_manageable(&self, actor: &Claims, user: &User) -> AppResult<()> {
        let actor_role = self.roles.resolve_role(&actor.role).await?;
        match self.roles.resolve_role(&user.role).await {
            Ok(current) => ensure_covers(&actor_role, &current),
            // Accounts left on a deleted custom role stay manageable.
            Err(_) => Ok(()),
        }
    }
}
