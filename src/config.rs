use serde::Deserialize;

/// Signing secrets and lifetimes for the three token purposes.
///
/// Each purpose keeps its own secret so rotating or leaking one cannot
/// forge tokens issued for another.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub activation_secret: String,
    pub session_secret: String,
    pub reset_secret: String,
    pub activation_ttl_minutes: i64,
    pub session_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PasswordSchemeKind {
    Argon2,
    HmacSha256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL of the frontend; activation/reset links and profile URLs
    /// are built from it.
    pub client_url: String,
    pub google_client_id: String,
    pub password_scheme: PasswordSchemeKind,
    pub tokens: TokenConfig,
    pub smtp: SmtpConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let client_url =
            std::env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let google_client_id = std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default();
        let password_scheme = match std::env::var("PASSWORD_SCHEME").as_deref() {
            Ok("hmac-sha256") => PasswordSchemeKind::HmacSha256,
            _ => PasswordSchemeKind::Argon2,
        };
        let tokens = TokenConfig {
            activation_secret: std::env::var("JWT_ACCOUNT_ACTIVATION")?,
            session_secret: std::env::var("JWT_SECRET")?,
            reset_secret: std::env::var("JWT_RESET_PASSWORD")?,
            activation_ttl_minutes: env_i64("JWT_ACTIVATION_TTL_MINUTES", 10),
            session_ttl_minutes: env_i64("JWT_SESSION_TTL_MINUTES", 60 * 24),
            reset_ttl_minutes: env_i64("JWT_RESET_TTL_MINUTES", 10),
        };
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from: std::env::var("EMAIL_FROM").unwrap_or_else(|_| "noreply@seoblog.com".into()),
        };
        Ok(Self {
            database_url,
            client_url,
            google_client_id,
            password_scheme,
            tokens,
            smtp,
        })
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}
