//! Session persistence contract
//!
//! The store maps configuration fingerprints to session records. Records are
//! replace-only, so concurrent writers on the same fingerprint resolve as
//! last-writer-wins; no read-modify-write coordination is required of an
//! implementation.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::session::SessionRecord;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, fingerprint: &str, record: &SessionRecord) -> Result<()>;
    async fn restore(&self, fingerprint: &str) -> Result<Option<SessionRecord>>;
    async fn delete(&self, fingerprint: &str) -> Result<()>;
}

/// Process-local store, used by tests and ephemeral sessions.
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, fingerprint: &str, record: &SessionRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(fingerprint.to_string(), record.clone());
        Ok(())
    }

    async fn restore(&self, fingerprint: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.read().await.get(fingerprint).cloned())
    }

    async fn delete(&self, fingerprint: &str) -> Result<()> {
        self.records.write().await.remove(fingerprint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::adapters::TokenResponse;
    use crate::auth::models::{AuthConfig, GrantType};

    fn sample_record() -> SessionRecord {
        let auth = AuthConfig {
            grant_type: GrantType::ClientCredentials,
            token_endpoint: Some("https://auth.example.com/oauth/token".to_string()),
            device_code_endpoint: None,
            resource_url: "https://collections.example.com".to_string(),
            client_id: Some("atlas-client".to_string()),
            client_secret: Some("s3cret".to_string()),
            scope: None,
            audience: None,
            subject_token: None,
            requested_token_type: None,
            cloud_platform: None,
        };
        SessionRecord::from_token_response(
            &auth,
            &TokenResponse {
                access_token: "atk-1".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 60,
                refresh_token: Some("rtk-1".to_string()),
                scope: None,
            },
        )
    }

    #[tokio::test]
    async fn test_save_restore_round_trip() {
        let store = MemorySessionStore::new();
        let record = sample_record();
        store.save("fp-1", &record).await.unwrap();
        let restored = store.restore("fp-1").await.unwrap().unwrap();
        assert_eq!(restored, record);
    }

    #[tokio::test]
    async fn test_restore_missing_returns_none() {
        let store = MemorySessionStore::new();
        assert!(store.restore("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemorySessionStore::new();
        let record = sample_record();
        store.save("fp-1", &record).await.unwrap();
        store.delete("fp-1").await.unwrap();
        store.delete("fp-1").await.unwrap();
        assert!(store.restore("fp-1").await.unwrap().is_none());
    }
}
