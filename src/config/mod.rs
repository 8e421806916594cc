//! SQLite-based configuration module for the Atlas CLI
//!
//! Provides persistent storage for:
//! - Service endpoint definitions (URL + authentication configurations)
//! - Acquired sessions, keyed by authentication-config fingerprint
//! - The one-time platform subject token handed over by a launcher

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub mod db;
pub mod models;
pub mod repository;

use crate::auth::models::ServiceEndpoint;
use crate::auth::store::SessionStore;
use crate::auth::subject_token::SubjectTokenSource;

/// Main configuration manager using the SQLite backend.
pub struct Config {
    pub(crate) pool: sqlx::SqlitePool,
    config_path: PathBuf,
}

impl Config {
    /// Get the path to the SQLite database file
    pub fn get_db_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("atlas-cli")
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".atlas-cli")
        };

        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {config_dir:?}"))?;
            log::info!("Created config directory: {config_dir:?}");
        }

        Ok(config_dir.join("config.db"))
    }

    /// Load configuration from the SQLite database
    pub async fn load() -> Result<Self> {
        let db_path = Self::get_db_path()?;
        log::debug!("Loading config from: {db_path:?}");

        let pool = db::connect(&db_path).await?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            config_path: db_path,
        })
    }

    /// Create a new config for testing (in-memory database)
    pub async fn new_test() -> Result<Self> {
        let pool = db::connect_memory().await?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            config_path: PathBuf::from(":memory:"),
        })
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    // Endpoint management

    pub async fn add_endpoint(&self, endpoint: &ServiceEndpoint) -> Result<()> {
        repository::endpoints::insert(&self.pool, endpoint).await
    }

    pub async fn get_endpoint(&self, id: &str) -> Result<Option<ServiceEndpoint>> {
        repository::endpoints::get(&self.pool, id).await
    }

    pub async fn list_endpoints(&self) -> Result<Vec<ServiceEndpoint>> {
        repository::endpoints::list(&self.pool).await
    }

    pub async fn delete_endpoint(&self, id: &str) -> Result<()> {
        repository::endpoints::delete(&self.pool, id).await
    }

    // Session management

    /// A [`SessionStore`] backed by this configuration database.
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        Arc::new(repository::sessions::SqliteSessionStore::new(
            self.pool.clone(),
        ))
    }

    // Platform subject token

    pub async fn set_platform_subject_token(&self, token: &str) -> Result<()> {
        repository::context::set_platform_subject_token(&self.pool, token).await
    }

    /// A [`SubjectTokenSource`] whose `take` consumes the persisted token.
    pub fn platform_subject_token_source(&self) -> Arc<dyn SubjectTokenSource> {
        Arc::new(PersistedSubjectTokenSource {
            pool: self.pool.clone(),
        })
    }
}

struct PersistedSubjectTokenSource {
    pool: sqlx::SqlitePool,
}

#[async_trait]
impl SubjectTokenSource for PersistedSubjectTokenSource {
    async fn take(&self) -> Result<Option<String>> {
        repository::context::take_platform_subject_token(&self.pool).await
    }
}
