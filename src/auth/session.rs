//! Persisted session records

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use super::adapters::TokenResponse;
use super::models::AuthConfig;

/// Bumped whenever the persisted layout changes shape.
pub const SESSION_MODEL_VERSION: u32 = 4;

/// One acquired credential, as persisted in the session store.
///
/// Records are replace-only: refresh and reauthentication write a whole new
/// record under the same fingerprint, and clearing the access token is the
/// only field-level mutation. The embedded [`AuthConfig`] is what lets a later
/// process decide between refresh and full reauthentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub model_version: u32,
    pub config_fingerprint: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds.
    pub valid_until: i64,
    pub auth: AuthConfig,
}

impl SessionRecord {
    pub fn from_token_response(auth: &AuthConfig, response: &TokenResponse) -> Self {
        let issued_at = now_unix();
        Self {
            model_version: SESSION_MODEL_VERSION,
            config_fingerprint: auth.fingerprint(),
            access_token: Some(response.access_token.clone()),
            refresh_token: response.refresh_token.clone(),
            token_type: response.token_type.clone(),
            scope: response.scope.clone(),
            issued_at,
            valid_until: issued_at + response.expires_in,
            auth: auth.clone(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid_until > now_unix()
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Redacted token prefix for status output and logs. Never the full token.
    pub fn token_preview(&self) -> Option<String> {
        self.access_token.as_deref().map(|token| {
            if token.len() <= 24 {
                format!("{token}...")
            } else {
                format!("{}...", &token[..24])
            }
        })
    }
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Decode the payload claims of a JWT without verifying its signature.
///
/// Diagnostics only: token validation belongs to the authorization server.
pub fn decode_claims_unverified(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    serde_json::from_slice(&decoded).ok()
}
