//! OAuth2 grant adapters
//!
//! One adapter per supported grant type; each knows how to execute exactly
//! one token-acquisition protocol against a token endpoint. The set is
//! closed: compatibility checks are static per adapter and the factory scans
//! them in a fixed order.

pub mod client_credentials;
pub mod device_code;
pub mod token_exchange;

pub use client_credentials::ClientCredentialsAdapter;
pub use device_code::DeviceCodeAdapter;
pub use token_exchange::TokenExchangeAdapter;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::AuthError;
use super::models::GrantType;
use crate::http::TraceSpan;

pub const SUBJECT_TOKEN_TYPE_JWT: &str = "urn:ietf:params:oauth:token-type:jwt";

/// Successful token-endpoint response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Error payload returned by OAuth2 endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorResponse {
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

#[async_trait]
pub trait GrantAdapter: Send + Sync {
    fn grant_type(&self) -> GrantType;

    /// Execute the acquisition protocol and return the raw token response.
    async fn acquire(&self, trace: &TraceSpan) -> Result<TokenResponse, AuthError>;
}

/// Decode a token-endpoint success body, mapping malformed payloads to a
/// grant failure rather than a transport error.
pub(crate) async fn read_token_response(
    response: reqwest::Response,
    context: &str,
) -> Result<TokenResponse, AuthError> {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str(&body).map_err(|error| {
        AuthError::grant(format!(
            "{context}: the token endpoint returned an unparseable response ({error})"
        ))
    })
}
