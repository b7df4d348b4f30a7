use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Credential material and the pending reset
/// token are never serialized into responses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    /// Public profile URL, derived from the username at creation.
    pub profile: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    /// 0 = ordinary user, 1 = admin.
    pub role: i32,
    /// Signed reset token, verbatim; empty while no reset is pending.
    #[serde(skip_serializing)]
    pub reset_password_token: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields required to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub profile: String,
    pub password_hash: String,
    pub password_salt: String,
}
