use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Request body for pre-signup (activation email dispatch).
#[derive(Debug, Deserialize)]
pub struct PreSignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for signup completion. The token is optional on purpose:
/// a missing token yields a generic retry message, not an error.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub token: Option<String>,
}

/// Request body for sign-in.
#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub reset_password_token: String,
    pub new_password: String,
}

/// Request body for Google federated login.
#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

/// Response carrying only a human-readable outcome message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response returned after sign-in or federated login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Redacted user projection: no credential material, no reset token.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: i32,
    pub name: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            name: user.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_serializes_identity_fields_only() {
        let response = PublicUser {
            id: Uuid::new_v4(),
            username: "x1y2z3".into(),
            email: "test@example.com".into(),
            role: 0,
            name: "Test".into(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("x1y2z3"));
        assert!(!json.contains("password"));
        assert!(!json.contains("salt"));
    }
}
