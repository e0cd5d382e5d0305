use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{PgSessionRepo, PgUserRepo, SessionRepo, UserRepo};
use crate::auth::services::CredentialStore;
use crate::auth::session::SessionAuthenticator;
use crate::config::AppConfig;
use crate::memory::{MemorySessionRepo, MemoryUserRepo, MemoryWorkshopRepo};
use crate::registrations::repo::{PgRegistrationRepo, RegistrationRepo};
use crate::registrations::services::RegistrationService;
use crate::workshops::repo::{PgWorkshopRepo, WorkshopRepo};
use crate::workshops::services::WorkshopService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Option<PgPool>,
    pub credentials: CredentialStore,
    pub sessions: SessionAuthenticator,
    pub workshops: WorkshopService,
    pub registrations: RegistrationService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let Some(url) = config.database_url.clone() else {
            warn!("DATABASE_URL not set; using in-memory stores, data is lost on restart");
            return Self::in_memory(config);
        };

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await
            .context("connect to database")?;

        Self::from_parts(
            config,
            Some(db.clone()),
            Arc::new(PgUserRepo::new(db.clone())),
            Arc::new(PgSessionRepo::new(db.clone())),
            Arc::new(PgWorkshopRepo::new(db.clone())),
            Arc::new(PgRegistrationRepo::new(db)),
        )
    }

    pub fn in_memory(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let workshops = Arc::new(MemoryWorkshopRepo::default());
        Self::from_parts(
            config,
            None,
            Arc::new(MemoryUserRepo::default()),
            Arc::new(MemorySessionRepo::default()),
            workshops.clone(),
            workshops,
        )
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        db: Option<PgPool>,
        users: Arc<dyn UserRepo>,
        sessions: Arc<dyn SessionRepo>,
        workshops: Arc<dyn WorkshopRepo>,
        registrations: Arc<dyn RegistrationRepo>,
    ) -> anyhow::Result<Self> {
        let registrations = RegistrationService::new(registrations, users.clone());
        let credentials = CredentialStore::new(users, &config.hashing)?;
        let sessions = SessionAuthenticator::new(JwtKeys::from_config(&config.jwt), sessions);
        Ok(Self {
            config,
            db,
            credentials,
            sessions,
            workshops: WorkshopService::new(workshops),
            registrations,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            max_connections: 1,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            hashing: crate::auth::password::test_hashing(),
            admin_seed: None,
        });
        Self::in_memory(config).expect("in-memory state")
    }
}
