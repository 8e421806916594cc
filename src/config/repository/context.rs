//! Repository for the one-time platform subject token
//!
//! The token is consumed transactionally: the read and the clear commit
//! together, so two concurrent takers cannot both observe it.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Store a subject token for one later exchange
pub async fn set_platform_subject_token(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query(
        "UPDATE app_context SET platform_subject_token = ?, updated_at = CURRENT_TIMESTAMP WHERE id = 1",
    )
    .bind(token)
    .execute(pool)
    .await
    .context("Failed to store the platform subject token")?;

    log::debug!("Stored a platform subject token");
    Ok(())
}

/// Remove and return the pending subject token, if any
pub async fn take_platform_subject_token(pool: &SqlitePool) -> Result<Option<String>> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin the subject-token transaction")?;

    let token: Option<(Option<String>,)> =
        sqlx::query_as("SELECT platform_subject_token FROM app_context WHERE id = 1")
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read the platform subject token")?;
    let token = token.and_then(|(value,)| value);

    if token.is_some() {
        sqlx::query(
            "UPDATE app_context SET platform_subject_token = NULL, updated_at = CURRENT_TIMESTAMP WHERE id = 1",
        )
        .execute(&mut *tx)
        .await
        .context("Failed to clear the platform subject token")?;
        log::debug!("Consumed the platform subject token");
    }

    tx.commit()
        .await
        .context("Failed to commit the subject-token transaction")?;

    Ok(token)
}
