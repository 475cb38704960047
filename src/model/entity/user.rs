use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::web::AuthenticatedUser;
use crate::web::UserRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct UserEntity {
    id: Uuid,
    email: String,
    full_name: String,
    #[serde(skip)]
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct UserEntityCreateUpdate {
    pub email: String,
    pub full_name: String,
    /// Ignored by `update`, passwords are only set on creation.
    pub password_hash: String,
}

impl ResourceTyped for UserEntity {
    fn get_resource_type() -> crate::model::repo::ResourceType {
        crate::model::repo::ResourceType::User
    }
}

impl UserEntity {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn hash(&self) -> &str {
        &self.password_hash
    }

    pub fn role(&self) -> UserRole {
        UserRole::from(self.role.as_str())
    }
}

/// Emails are compared case-insensitively everywhere.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait::async_trait]
impl CrudRepository<UserEntity, UserEntityCreateUpdate, Uuid> for UserEntity {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let user = sqlx::query_as(
            "INSERT INTO users (id, email, full_name, password_hash, role) VALUES ($1,$2,$3,$4,$5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(&data.email))
        .bind(data.full_name.trim())
        .bind(&data.password_hash)
        .bind(UserRole::Student.to_string())
        .fetch_one(mm.executor())
        .await?;

        Ok(user)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let user = sqlx::query_as(
            "UPDATE users SET email = $1, full_name = $2, updated_at = now() WHERE id = $3 RETURNING *",
        )
        .bind(normalize_email(&data.email))
        .bind(data.full_name.trim())
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(user)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    async fn list(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as("SELECT * FROM users ORDER BY created_at LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(UserEntity, UserEntityCreateUpdate, Uuid);

#[async_trait]
impl HasOwner for UserEntity {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.id) // owners of users are themselves
    }
}

impl UserEntity {
    pub async fn find_by_email(mm: &ModelManager, email: &str) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn set_role(self, mm: &ModelManager, role: UserRole) -> DatabaseResult<Self> {
        let user = sqlx::query_as(
            "UPDATE users SET role = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(role.to_string())
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        Ok(user)
    }

    /// Creates the configured administrator, or promotes the existing account with that email.
    #[tracing::instrument(skip(mm, password_hash))]
    pub async fn ensure_admin(
        mm: &ModelManager,
        email: &str,
        password_hash: impl FnOnce() -> crate::auth::AuthResult<String>,
    ) -> crate::error::AppResult<Self> {
        if let Some(existing) = Self::find_by_email(mm, email).await? {
            if existing.role() == UserRole::Admin {
                return Ok(existing);
            }
            tracing::info!("promoting {} to admin", existing.email());
            return Ok(existing.set_role(mm, UserRole::Admin).await?);
        }

        let created = Self::create(
            mm,
            &AuthenticatedUser::admin(),
            UserEntityCreateUpdate {
                email: email.to_string(),
                full_name: String::from("Administrator"),
                password_hash: password_hash()?,
            },
        )
        .await?;
        tracing::info!("created admin account {}", created.email());
        Ok(created.set_role(mm, UserRole::Admin).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_email_test() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }
}
