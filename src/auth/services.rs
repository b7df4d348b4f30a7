use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

use crate::config::AppConfig;
use crate::mailer::EmailMessage;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Random public username: short, lowercase, URL-safe. Uniqueness is
/// enforced by the store, not here.
pub(crate) fn new_username() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..10)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

pub(crate) fn profile_url(config: &AppConfig, username: &str) -> String {
    format!("{}/profile/{}", config.client_url, username)
}

pub(crate) fn activation_email(config: &AppConfig, to: &str, token: &str) -> EmailMessage {
    EmailMessage {
        from: config.smtp.from.clone(),
        to: to.to_string(),
        subject: "Account activation link".into(),
        html: format!(
            "<p>Please use the following link to activate your account:</p>\
             <p>{}/auth/account/activate/{}</p>\
             <hr />\
             <p>This email may contain sensitive information</p>",
            config.client_url, token
        ),
    }
}

pub(crate) fn reset_email(config: &AppConfig, to: &str, token: &str) -> EmailMessage {
    EmailMessage {
        from: config.smtp.from.clone(),
        to: to.to_string(),
        subject: "Password reset link".into(),
        html: format!(
            "<p>Please use the following link to reset your password:</p>\
             <p>{}/auth/password/reset/{}</p>\
             <hr />\
             <p>This email may contain sensitive information</p>",
            config.client_url, token
        ),
    }
}
