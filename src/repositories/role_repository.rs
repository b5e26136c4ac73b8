use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::IndexOptions, IndexModel};

use crate::{
    db::{memory::MemoryTransaction, mongo::MongoTransaction, mongo::ROLES, Database},
    errors::{AppError, AppResult},
    models::domain::{role::normalize_role_name, Role},
};

#[async_trait]
pub trait RoleRepository: Send {
    async fn insert_role(&mut self, role: &Role) -> AppResult<()>;
    async fn find_role_by_name(&mut self, name: &str) -> AppResult<Option<Role>>;
    async fn list_roles(&mut self) -> AppResult<Vec<Role>>;
    async fn delete_role(&mut self, name: &str) -> AppResult<bool>;
    async fn delete_all_roles(&mut self) -> AppResult<u64>;
}

#[async_trait]
impl RoleRepository for MongoTransaction {
    async fn insert_role(&mut self, role: &Role) -> AppResult<()> {
        self.roles.insert_one(role).session(&mut self.session).await?;
        Ok(())
    }

    async fn find_role_by_name(&mut self, name: &str) -> AppResult<Option<Role>> {
        let role = self
            .roles
            .find_one(doc! { "name": normalize_role_name(name) })
            .session(&mut self.session)
            .await?;
        Ok(role)
    }

    async fn list_roles(&mut self) -> AppResult<Vec<Role>> {
        let mut cursor = self
            .roles
            .find(doc! {})
            .sort(doc! { "name": 1 })
            .session(&mut self.session)
            .await?;
        let roles: Vec<Role> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(roles)
    }

    async fn delete_role(&mut self, name: &str) -> AppResult<bool> {
        let result = self
            .roles
            .delete_one(doc! { "name": normalize_role_name(name) })
            .session(&mut self.session)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_all_roles(&mut self) -> AppResult<u64> {
        let result = self
            .roles
            .delete_many(doc! {})
            .session(&mut self.session)
            .await?;
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl RoleRepository for MemoryTransaction {
    async fn insert_role(&mut self, role: &Role) -> AppResult<()> {
        let roles = &mut self.working.roles;
        if roles.values().any(|r| r.name == role.name) || roles.contains_key(&role.id) {
            return Err(AppError::AlreadyExists(format!(
                "Role '{}' already exists",
                role.name
            )));
        }
        roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn find_role_by_name(&mut self, name: &str) -> AppResult<Option<Role>> {
        let name = normalize_role_name(name);
        Ok(self
            .working
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list_roles(&mut self) -> AppResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.working.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn delete_role(&mut self, name: &str) -> AppResult<bool> {
        let name = normalize_role_name(name);
        let before = self.working.roles.len();
        self.working.roles.retain(|_, r| r.name != name);
        Ok(self.working.roles.len() < before)
    }

    async fn delete_all_roles(&mut self) -> AppResult<u64> {
        let count = self.working.roles.len() as u64;
        self.working.roles.clear();
        Ok(count)
    }
}

pub async fn ensure_indexes(db: &Database) -> AppResult<()> {
    let roles = db.get_collection::<Role>(ROLES);
    let unique = IndexOptions::builder().unique(true).build();

    roles
        .create_index(
            IndexModel::builder()
                .keys(doc! { "id": 1 })
                .options(unique.clone())
                .build(),
        )
        .await?;
    roles
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(unique)
                .build(),
        )
        .await?;

    log::info!("ensured indexes on '{}'", ROLES);
    Ok(())
}
