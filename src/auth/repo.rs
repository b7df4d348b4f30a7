use axum::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint on username/email violated.
    #[error("duplicate key")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence collaborator for user records. Single-document operations
/// only; uniqueness on username/email is enforced by the store itself.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn insert(&self, new: NewUser) -> Result<User, StoreError>;
    async fn set_reset_token(&self, id: Uuid, token: &str) -> Result<(), StoreError>;
    /// Rotates the credential and clears any pending reset token in one
    /// statement, so a consumed reset link cannot be replayed.
    async fn update_password(&self, id: Uuid, salt: &str, hash: &str) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id, username, name, email, profile, password_hash, password_salt, \
                            role, reset_password_token, created_at, updated_at";

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        // Exact match against the persisted signed token; an empty pending
        // token can never match a submitted one.
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_password_token = $1 \
             AND reset_password_token <> ''"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, name, email, profile, password_hash, password_salt) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.profile)
        .bind(&new.password_hash)
        .bind(&new.password_salt)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)?;
        Ok(user)
    }

    async fn set_reset_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET reset_password_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, salt: &str, hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, password_salt = $3, \
             reset_password_token = '', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .bind(salt)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
