use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    db::{finish, Store, Transaction},
    errors::{AppError, AppResult},
    models::domain::role::{normalize_role_name, system_roles},
    models::domain::Role,
};

/// Role and permission lookup. Roles are read from the store once at start-up
/// and cached; every mutation goes through the store and then refreshes the cache.
pub struct RoleRegistry {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<String, Role>>,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Builds the registry and loads the current role set.
    pub async fn load(store: Arc<dyn Store>) -> AppResult<Self> {
        let registry = Self::new(store);
        registry.refresh().await?;
        Ok(registry)
    }

    pub async fn refresh(&self) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = tx.list_roles().await;
        let roles = finish(tx, outcome).await?;

        let mut cache = self.cache.write().await;
        *cache = roles.into_iter().map(|r| (r.name.clone(), r)).collect();
        log::debug!("role cache loaded with {} roles", cache.len());
        Ok(())
    }

    pub async fn resolve_role(&self, name: &str) -> AppResult<Role> {
        let name = normalize_role_name(name);
        self.cache
            .read()
            .await
            .get(&name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Role '{}' not found", name)))
    }

    /// False for unknown roles.
    pub async fn role_can(&self, name: &str, capability: &str) -> bool {
        self.resolve_role(name)
            .await
            .map(|role| role.has_permission(capability))
            .unwrap_or(false)
    }

    pub async fn list_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.cache.read().await.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    /// Replaces every role with the fixed system set in one transaction.
    pub async fn seed(&self) -> AppResult<Vec<Role>> {
        let roles = system_roles();

        let mut tx = self.store.begin().await?;
        let outcome = Self::replace_all(tx.as_mut(), &roles).await;
        let removed = finish(tx, outcome).await?;

        log::info!(
            "seeded {} system roles (removed {} existing)",
            roles.len(),
            removed
        );
        self.refresh().await?;
        Ok(roles)
    }

    async fn replace_all(tx: &mut dyn Transaction, roles: &[Role]) -> AppResult<u64> {
        let removed = tx.delete_all_roles().await?;
        for role in roles {
            tx.insert_role(role).await?;
        }
        Ok(removed)
    }

    pub async fn create_role(
        &self,
        name: &str,
        display_name: &str,
        description: Option<&str>,
        permissions: &[String],
    ) -> AppResult<Role> {
        let permissions: Vec<&str> = permissions.iter().map(String::as_str).collect();
        let role = Role::new(name, display_name, description, &permissions, false);
        if role.name.is_empty() {
            return Err(AppError::ValidationError("Role name is required".into()));
        }

        let mut tx = self.store.begin().await?;
        let outcome = tx.insert_role(&role).await;
        finish(tx, outcome).await?;

        self.refresh().await?;
        log::info!("created role '{}'", role.name);
        Ok(role)
    }

    pub async fn delete_role(&self, name: &str) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::delete_custom(tx.as_mut(), name).await;
        finish(tx, outcome).await?;

        self.refresh().await?;
        log::info!("deleted role '{}'", normalize_role_name(name));
        Ok(())
    }

    async fn delete_custom(tx: &mut dyn Transaction, name: &str) -> AppResult<()> {
        let role = tx
            .find_role_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role '{}' not found", name)))?;
        if role.is_system {
            return Err(AppError::SystemRoleProtected(role.name));
        }
        tx.delete_role(&role.name).await?;
        Ok(())
    }
}
