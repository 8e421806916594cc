//! Data models for the configuration database

use sqlx::FromRow;

/// Database representation of a service endpoint
#[derive(Debug, Clone, FromRow)]
pub struct DbEndpoint {
    pub id: String,
    pub url: String,
    pub authentication: Option<String>,          // JSON
    pub fallback_authentications: Option<String>, // JSON
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Database representation of a persisted session
#[derive(Debug, Clone, FromRow)]
pub struct DbSession {
    pub fingerprint: String,
    pub model_version: i64,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub issued_at: i64,
    pub valid_until: i64,
    pub auth_config: String, // JSON
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
