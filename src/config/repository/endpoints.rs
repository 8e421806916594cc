//! Repository for service endpoint operations

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::auth::models::{AuthConfig, ServiceEndpoint};
use crate::config::models::DbEndpoint;

/// Insert or update an endpoint
pub async fn insert(pool: &SqlitePool, endpoint: &ServiceEndpoint) -> Result<()> {
    let authentication = endpoint
        .authentication
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize endpoint authentication")?;
    let fallbacks = if endpoint.fallback_authentications.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&endpoint.fallback_authentications)
                .context("Failed to serialize endpoint fallback authentications")?,
        )
    };

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO endpoints (id, url, authentication, fallback_authentications, updated_at)
        VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(&endpoint.id)
    .bind(&endpoint.url)
    .bind(&authentication)
    .bind(&fallbacks)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to insert endpoint '{}'", endpoint.id))?;

    log::info!("Saved endpoint: {}", endpoint.id);
    Ok(())
}

/// Get an endpoint by id
pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<ServiceEndpoint>> {
    let row: Option<DbEndpoint> = sqlx::query_as(
        "SELECT id, url, authentication, fallback_authentications, created_at, updated_at \
         FROM endpoints WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to get endpoint '{id}'"))?;

    row.map(from_row).transpose()
}

/// List all endpoints ordered by id
pub async fn list(pool: &SqlitePool) -> Result<Vec<ServiceEndpoint>> {
    let rows: Vec<DbEndpoint> = sqlx::query_as(
        "SELECT id, url, authentication, fallback_authentications, created_at, updated_at \
         FROM endpoints ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list endpoints")?;

    rows.into_iter().map(from_row).collect()
}

/// Delete an endpoint by id
pub async fn delete(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete endpoint '{id}'"))?;

    if result.rows_affected() > 0 {
        log::debug!("Deleted endpoint: {id}");
    }

    Ok(())
}

fn from_row(row: DbEndpoint) -> Result<ServiceEndpoint> {
    let authentication: Option<AuthConfig> = row
        .authentication
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .with_context(|| format!("Failed to deserialize authentication for '{}'", row.id))?;
    let fallback_authentications: Vec<AuthConfig> = row
        .fallback_authentications
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .with_context(|| {
            format!(
                "Failed to deserialize fallback authentications for '{}'",
                row.id
            )
        })?
        .unwrap_or_default();

    Ok(ServiceEndpoint {
        id: row.id,
        url: row.url,
        authentication,
        fallback_authentications,
    })
}
