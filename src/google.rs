use axum::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AuthError;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// The identity assertion we extract from a verified Google ID token.
#[derive(Debug, Clone)]
pub struct GoogleIdentity {
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    /// Unique id of this assertion (`jti`, falling back to `sub`). Used as
    /// password material when provisioning an account from a federated
    /// login.
    pub subject_id: String,
}

/// Verifies a third-party identity token and extracts its assertion.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AuthError>;
}

pub struct GoogleVerifier {
    http: reqwest::Client,
    client_id: String,
}

impl GoogleVerifier {
    pub fn new(client_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.to_string(),
        }
    }
}

/// Subset of the claims Google's tokeninfo endpoint echoes back.
/// Boolean claims come back as strings.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    email_verified: Option<String>,
    name: Option<String>,
    jti: Option<String>,
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AuthError> {
        let response = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "tokeninfo request failed");
                AuthError::InvalidIdentityToken
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "tokeninfo rejected id token");
            return Err(AuthError::InvalidIdentityToken);
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|_| AuthError::InvalidIdentityToken)?;

        // The token must have been minted for us, not some other client.
        if info.aud != self.client_id {
            warn!(aud = %info.aud, "id token audience mismatch");
            return Err(AuthError::InvalidIdentityToken);
        }

        let email = info.email.ok_or(AuthError::InvalidIdentityToken)?;
        let email_verified = info.email_verified.as_deref() == Some("true");
        let name = info.name.unwrap_or_else(|| email.clone());
        let subject_id = info.jti.unwrap_or(info.sub);

        debug!(email = %email, verified = email_verified, "google id token verified");
        Ok(GoogleIdentity {
            email,
            email_verified,
            name,
            subject_id,
        })
    }
}
