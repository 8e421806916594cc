//! Repository for persisted session operations

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::auth::models::AuthConfig;
use crate::auth::session::SessionRecord;
use crate::auth::store::SessionStore;
use crate::config::models::DbSession;

/// Save or replace the session for a fingerprint
pub async fn save(pool: &SqlitePool, fingerprint: &str, record: &SessionRecord) -> Result<()> {
    let auth_config = serde_json::to_string(&record.auth)
        .context("Failed to serialize session authentication config")?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO sessions
            (fingerprint, model_version, access_token, refresh_token, token_type, scope,
             issued_at, valid_until, auth_config, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(fingerprint)
    .bind(record.model_version as i64)
    .bind(&record.access_token)
    .bind(&record.refresh_token)
    .bind(&record.token_type)
    .bind(&record.scope)
    .bind(record.issued_at)
    .bind(record.valid_until)
    .bind(&auth_config)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save session '{fingerprint}'"))?;

    log::debug!("Saved session: {fingerprint}");
    Ok(())
}

/// Get the session for a fingerprint
pub async fn get(pool: &SqlitePool, fingerprint: &str) -> Result<Option<SessionRecord>> {
    let row: Option<DbSession> = sqlx::query_as(
        "SELECT fingerprint, model_version, access_token, refresh_token, token_type, scope, \
                issued_at, valid_until, auth_config, updated_at \
         FROM sessions WHERE fingerprint = ?",
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to get session '{fingerprint}'"))?;

    if let Some(row) = row {
        let auth: AuthConfig = serde_json::from_str(&row.auth_config)
            .context("Failed to deserialize session authentication config")?;
        Ok(Some(SessionRecord {
            model_version: row.model_version as u32,
            config_fingerprint: row.fingerprint,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_type: row.token_type,
            scope: row.scope,
            issued_at: row.issued_at,
            valid_until: row.valid_until,
            auth,
        }))
    } else {
        Ok(None)
    }
}

/// Delete the session for a fingerprint
pub async fn delete(pool: &SqlitePool, fingerprint: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM sessions WHERE fingerprint = ?")
        .bind(fingerprint)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete session '{fingerprint}'"))?;

    if result.rows_affected() > 0 {
        log::debug!("Deleted session: {fingerprint}");
    }

    Ok(())
}

/// [`SessionStore`] backed by the configuration database.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, fingerprint: &str, record: &SessionRecord) -> Result<()> {
        save(&self.pool, fingerprint, record).await
    }

    async fn restore(&self, fingerprint: &str) -> Result<Option<SessionRecord>> {
        get(&self.pool, fingerprint).await
    }

    async fn delete(&self, fingerprint: &str) -> Result<()> {
        delete(&self.pool, fingerprint).await
    }
}
