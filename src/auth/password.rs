use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::error;

use crate::config::PasswordSchemeKind;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Derived credential material as it is persisted on the user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub salt: String,
    pub hash: String,
}

/// One-way password derivation and verification.
///
/// The salt is regenerated on every `derive`, so setting the same password
/// twice yields different stored material. Plaintext never leaves this
/// boundary.
pub trait CredentialScheme: Send + Sync {
    fn derive(&self, plain: &str) -> Result<Credential, AuthError>;
    fn verify(&self, plain: &str, salt: &str, hash: &str) -> bool;
}

pub fn scheme_for(kind: PasswordSchemeKind) -> Box<dyn CredentialScheme> {
    match kind {
        PasswordSchemeKind::Argon2 => Box::new(Argon2Scheme),
        PasswordSchemeKind::HmacSha256 => Box::new(HmacScheme),
    }
}

/// Default scheme: memory-hard KDF. The salt column keeps the generated
/// salt for the data-model invariant; verification reads the PHC string,
/// which embeds it as well.
pub struct Argon2Scheme;

impl CredentialScheme for Argon2Scheme {
    fn derive(&self, plain: &str) -> Result<Credential, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AuthError::Internal(anyhow::anyhow!(e.to_string()))
            })?
            .to_string();
        Ok(Credential {
            salt: salt.to_string(),
            hash,
        })
    }

    fn verify(&self, plain: &str, _salt: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Legacy salted keyed-hash scheme: hash = hex(HMAC-SHA256(key = salt,
/// plaintext)). Deterministic given (salt, plaintext), so verification
/// recomputes and compares. Not memory-hard; kept for stores that predate
/// the argon2 default.
pub struct HmacScheme;

impl HmacScheme {
    /// An empty plaintext hashes to the empty-string sentinel rather than
    /// failing, so there is always a defined value to compare against.
    fn digest(plain: &str, salt: &str) -> String {
        if plain.is_empty() {
            return String::new();
        }
        let mut mac = match HmacSha256::new_from_slice(salt.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(plain.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl CredentialScheme for HmacScheme {
    fn derive(&self, plain: &str) -> Result<Credential, AuthError> {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let salt = hex::encode(bytes);
        let hash = Self::digest(plain, &salt);
        Ok(Credential { salt, hash })
    }

    fn verify(&self, plain: &str, salt: &str, hash: &str) -> bool {
        Self::digest(plain, salt) == hash
    }
}
