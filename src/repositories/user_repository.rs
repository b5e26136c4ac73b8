use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{IndexOptions, ReplaceOptions},
    IndexModel,
};

use crate::{
    db::{memory::MemoryTransaction, mongo::MongoTransaction, mongo::USERS, Database},
    errors::{AppError, AppResult},
    models::domain::{user::normalize_email, User},
    repositories::page,
};

#[async_trait]
pub trait UserRepository: Send {
    async fn insert_user(&mut self, user: &User) -> AppResult<()>;
    async fn find_user_by_id(&mut self, id: &str) -> AppResult<Option<User>>;
    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>>;
    async fn find_user_by_verification_hash(&mut self, hash: &str) -> AppResult<Option<User>>;
    async fn find_user_by_reset_hash(&mut self, hash: &str) -> AppResult<Option<User>>;
    async fn replace_user(&mut self, user: &User) -> AppResult<()>;
    async fn delete_user(&mut self, id: &str) -> AppResult<()>;
    /// Newest accounts first, with the total count.
    async fn list_users(&mut self, offset: i64, limit: i64) -> AppResult<(Vec<User>, i64)>;
}

fn user_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("User with id '{}' not found", id))
}

#[async_trait]
impl UserRepository for MongoTransaction {
    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        self.users.insert_one(user).session(&mut self.session).await?;
        Ok(())
    }

    async fn find_user_by_id(&mut self, id: &str) -> AppResult<Option<User>> {
        let user = self
            .users
            .find_one(doc! { "id": id })
            .session(&mut self.session)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        let user = self
            .users
            .find_one(doc! { "email": normalize_email(email) })
            .session(&mut self.session)
            .await?;
        Ok(user)
    }

    async fn find_user_by_verification_hash(&mut self, hash: &str) -> AppResult<Option<User>> {
        let user = self
            .users
            .find_one(doc! { "email_verification.hash": hash })
            .session(&mut self.session)
            .await?;
        Ok(user)
    }

    async fn find_user_by_reset_hash(&mut self, hash: &str) -> AppResult<Option<User>> {
        let user = self
            .users
            .find_one(doc! { "password_reset.hash": hash })
            .session(&mut self.session)
            .await?;
        Ok(user)
    }

    async fn replace_user(&mut self, user: &User) -> AppResult<()> {
        let options = ReplaceOptions::builder().upsert(false).build();
        let result = self
            .users
            .replace_one(doc! { "id": &user.id }, user)
            .with_options(options)
            .session(&mut self.session)
            .await?;

        if result.matched_count == 0 {
            return Err(user_not_found(&user.id));
        }
        Ok(())
    }

    async fn delete_user(&mut self, id: &str) -> AppResult<()> {
        let result = self
            .users
            .delete_one(doc! { "id": id })
            .session(&mut self.session)
            .await?;

        if result.deleted_count == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }

    async fn list_users(&mut self, offset: i64, limit: i64) -> AppResult<(Vec<User>, i64)> {
        let total = self
            .users
            .count_documents(doc! {})
            .session(&mut self.session)
            .await? as i64;

        let mut cursor = self
            .users
            .find(doc! {})
            .skip(offset.max(0) as u64)
            .limit(limit)
            .sort(doc! { "created_at": -1 })
            .session(&mut self.session)
            .await?;
        let users: Vec<User> = cursor.stream(&mut self.session).try_collect().await?;

        Ok((users, total))
    }
}

#[async_trait]
impl UserRepository for MemoryTransaction {
    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        let users = &mut self.working.users;
        if users.values().any(|u| u.email == user.email) || users.contains_key(&user.id) {
            return Err(AppError::AlreadyExists(format!(
                "User with email '{}' already exists",
                user.email
            )));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user_by_id(&mut self, id: &str) -> AppResult<Option<User>> {
        Ok(self.working.users.get(id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        let email = normalize_email(email);
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_verification_hash(&mut self, hash: &str) -> AppResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email_verification.as_ref().is_some_and(|t| t.hash == hash))
            .cloned())
    }

    async fn find_user_by_reset_hash(&mut self, hash: &str) -> AppResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.password_reset.as_ref().is_some_and(|t| t.hash == hash))
            .cloned())
    }

    async fn replace_user(&mut self, user: &User) -> AppResult<()> {
        match self.working.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(user_not_found(&user.id)),
        }
    }

    async fn delete_user(&mut self, id: &str) -> AppResult<()> {
        self.working
            .users
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| user_not_found(id))
    }

    async fn list_users(&mut self, offset: i64, limit: i64) -> AppResult<(Vec<User>, i64)> {
        let mut users: Vec<User> = self.working.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = users.len() as i64;
        Ok((page(users, offset, limit), total))
    }
}

pub async fn ensure_indexes(db: &Database) -> AppResult<()> {
    let users = db.get_collection::<User>(USERS);
    let unique = IndexOptions::builder().unique(true).build();
    let sparse = IndexOptions::builder().sparse(true).build();

    let models = vec![
        IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(unique.clone())
            .build(),
        IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(unique)
            .build(),
        IndexModel::builder()
            .keys(doc! { "email_verification.hash": 1 })
            .options(sparse.clone())
            .build(),
        IndexModel::builder()
            .keys(doc! { "password_reset.hash": 1 })
            .options(sparse)
            .build(),
    ];
    users.create_indexes(models).await?;

    log::info!("ensured indexes on '{}'", USERS);
    Ok(())
}
