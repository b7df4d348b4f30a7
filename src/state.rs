use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::password::{scheme_for, CredentialScheme};
use crate::auth::repo::{PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::google::{GoogleVerifier, IdentityVerifier};
use crate::mailer::{Mailer, SmtpMailer};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub google: Arc<dyn IdentityVerifier>,
    pub scheme: Arc<dyn CredentialScheme>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        let mailer = Arc::new(SmtpMailer::new(&config.smtp)?) as Arc<dyn Mailer>;
        let google =
            Arc::new(GoogleVerifier::new(&config.google_client_id)) as Arc<dyn IdentityVerifier>;
        let scheme: Arc<dyn CredentialScheme> = Arc::from(scheme_for(config.password_scheme));

        Ok(Self {
            db,
            config,
            users,
            mailer,
            google,
            scheme,
        })
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        google: Arc<dyn IdentityVerifier>,
        scheme: Arc<dyn CredentialScheme>,
    ) -> Self {
        Self {
            db,
            config,
            users,
            mailer,
            google,
            scheme,
        }
    }
}
