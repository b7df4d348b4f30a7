use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::TokenConfig, error::AuthError, state::AppState};

/// Claims of an activation token: the whole pending signup rides inside the
/// token, so nothing is persisted until the link is followed.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivationClaims {
    pub name: String,
    pub email: String,
    pub password: String,
    pub iat: usize,
    pub exp: usize,
}

/// Claims of a session or reset token: just the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubjectClaims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

struct PurposeKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl PurposeKeys {
    fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs((ttl_minutes.max(0) as u64) * 60),
        }
    }
}

/// Signing and verification keys for the three token purposes.
pub struct TokenKeys {
    activation: PurposeKeys,
    session: PurposeKeys,
    reset: PurposeKeys,
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.tokens)
    }
}

impl TokenKeys {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            activation: PurposeKeys::new(&config.activation_secret, config.activation_ttl_minutes),
            session: PurposeKeys::new(&config.session_secret, config.session_ttl_minutes),
            reset: PurposeKeys::new(&config.reset_secret, config.reset_ttl_minutes),
        }
    }

    pub fn sign_activation(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> anyhow::Result<String> {
        let (iat, exp) = stamp(self.activation.ttl);
        let claims = ActivationClaims {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            iat,
            exp,
        };
        let token = encode(&Header::default(), &claims, &self.activation.encoding)?;
        debug!(email = %email, "activation token signed");
        Ok(token)
    }

    pub fn sign_session(&self, user_id: Uuid) -> anyhow::Result<String> {
        let (iat, exp) = stamp(self.session.ttl);
        let claims = SubjectClaims { sub: user_id, iat, exp };
        let token = encode(&Header::default(), &claims, &self.session.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    pub fn sign_reset(&self, user_id: Uuid) -> anyhow::Result<String> {
        let (iat, exp) = stamp(self.reset.ttl);
        let claims = SubjectClaims { sub: user_id, iat, exp };
        let token = encode(&Header::default(), &claims, &self.reset.encoding)?;
        debug!(user_id = %user_id, "reset token signed");
        Ok(token)
    }

    pub fn verify_activation(&self, token: &str) -> Result<ActivationClaims, AuthError> {
        verify(token, &self.activation.decoding)
    }

    pub fn verify_session(&self, token: &str) -> Result<SubjectClaims, AuthError> {
        verify(token, &self.session.decoding)
    }

    pub fn verify_reset(&self, token: &str) -> Result<SubjectClaims, AuthError> {
        verify(token, &self.reset.decoding)
    }
}

fn stamp(ttl: Duration) -> (usize, usize) {
    let now = OffsetDateTime::now_utc();
    let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
    (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
}

/// Expiry, bad signature and malformed input all collapse into
/// `ExpiredOrInvalid`; the caller never learns which.
fn verify<C: DeserializeOwned>(token: &str, decoding: &DecodingKey) -> Result<C, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<C>(token, decoding, &validation).map_err(|e| {
        debug!(error = %e, "token verification failed");
        AuthError::ExpiredOrInvalid
    })?;
    Ok(data.claims)
}
