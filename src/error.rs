use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::repo::StoreError;

/// Failure taxonomy for the credential and token lifecycle.
///
/// Every failure is converted at the handler boundary into a
/// `{"error": message}` body with a matching status. Token verification
/// failures deliberately collapse expiry, tampering and malformation into
/// one message so the response leaks nothing about which it was.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email is taken")]
    EmailTaken,
    #[error("User with that email does not exist. Please signup")]
    UserNotFound,
    #[error("Email and password do not match")]
    BadCredentials,
    #[error("Expired or invalid link. Try again")]
    ExpiredOrInvalid,
    /// Reset token verified cryptographically but no user carries it any
    /// more: already consumed, or never issued by us.
    #[error("Something went wrong. Try again")]
    ResetNotFound,
    #[error("Email or username already exists")]
    DuplicateKey,
    #[error("Google login failed. Try again")]
    UnverifiedEmail,
    #[error("Could not verify identity token")]
    InvalidIdentityToken,
    #[error("{0}")]
    Validation(String),
    #[error("Could not save. Try again")]
    Storage(#[source] sqlx::Error),
    #[error("Could not send email. Try again")]
    Email(anyhow::Error),
    #[error("Internal error")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal(err)
    }
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailTaken
            | AuthError::UserNotFound
            | AuthError::BadCredentials
            | AuthError::DuplicateKey
            | AuthError::UnverifiedEmail
            | AuthError::Validation(_)
            | AuthError::Storage(_)
            | AuthError::Email(_) => StatusCode::BAD_REQUEST,
            AuthError::ExpiredOrInvalid
            | AuthError::ResetNotFound
            | AuthError::InvalidIdentityToken => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AuthError::DuplicateKey,
            StoreError::Database(e) => AuthError::Storage(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            AuthError::Storage(e) => error!(error = %e, "storage failure"),
            AuthError::Email(e) => error!(error = %e, "email dispatch failure"),
            AuthError::Internal(e) => error!(error = %e, "internal failure"),
            other => warn!(error = %other, "request rejected"),
        }
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
