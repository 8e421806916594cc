//! Database connection and schema management

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// Connect to the SQLite database at the given path, creating it if needed.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database at {path:?}"))
}

/// Connect to an in-memory database (tests).
///
/// A single connection keeps the in-memory database alive for the pool's
/// lifetime.
pub async fn connect_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new().in_memory(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("Failed to open in-memory database")
}

/// Create any missing tables.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS endpoints (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            authentication TEXT,
            fallback_authentications TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create endpoints table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            fingerprint TEXT PRIMARY KEY,
            model_version INTEGER NOT NULL,
            access_token TEXT,
            refresh_token TEXT,
            token_type TEXT NOT NULL,
            scope TEXT,
            issued_at INTEGER NOT NULL,
            valid_until INTEGER NOT NULL,
            auth_config TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create sessions table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS app_context (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            platform_subject_token TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create app_context table")?;

    sqlx::query("INSERT OR IGNORE INTO app_context (id, platform_subject_token) VALUES (1, NULL)")
        .execute(pool)
        .await
        .context("Failed to seed app_context row")?;

    Ok(())
}
