//! Authentication configuration models

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::cloud::CloudPlatform;

pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_TYPE_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

/// OAuth2 grant type as it appears on the wire.
///
/// Unrecognized values survive round-trips through [`GrantType::Other`] so a
/// configuration written by a newer client is not mangled by this one; they
/// are simply never compatible with any adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrantType {
    ClientCredentials,
    DeviceCode,
    TokenExchange,
    AuthorizationCode,
    Other(String),
}

impl GrantType {
    pub fn as_str(&self) -> &str {
        match self {
            GrantType::ClientCredentials => GRANT_TYPE_CLIENT_CREDENTIALS,
            GrantType::DeviceCode => GRANT_TYPE_DEVICE_CODE,
            GrantType::TokenExchange => GRANT_TYPE_TOKEN_EXCHANGE,
            GrantType::AuthorizationCode => GRANT_TYPE_AUTHORIZATION_CODE,
            GrantType::Other(value) => value,
        }
    }

    /// Whether sessions acquired through this grant can be renewed with a
    /// refresh-token call. Token exchange sessions are re-derived from a new
    /// subject token instead.
    pub fn supports_refresh(&self) -> bool {
        !matches!(self, GrantType::TokenExchange)
    }
}

impl From<&str> for GrantType {
    fn from(value: &str) -> Self {
        match value {
            GRANT_TYPE_CLIENT_CREDENTIALS => GrantType::ClientCredentials,
            GRANT_TYPE_DEVICE_CODE => GrantType::DeviceCode,
            GRANT_TYPE_TOKEN_EXCHANGE => GrantType::TokenExchange,
            GRANT_TYPE_AUTHORIZATION_CODE => GrantType::AuthorizationCode,
            other => GrantType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GrantType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GrantType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(GrantType::from(value.as_str()))
    }
}

/// One endpoint's OAuth2 authentication configuration.
///
/// Immutable once constructed. The content hash from [`AuthConfig::fingerprint`]
/// keys the persisted session for this configuration, so any change to the
/// configuration orphans the old session rather than corrupting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub grant_type: GrantType,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub device_code_endpoint: Option<String>,
    /// One or more resource URLs, space- or comma-delimited on the wire.
    pub resource_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub subject_token: Option<String>,
    #[serde(default)]
    pub requested_token_type: Option<String>,
    #[serde(default)]
    pub cloud_platform: Option<CloudPlatform>,
}

impl AuthConfig {
    /// Normalized list of resource URLs.
    pub fn resource_urls(&self) -> Vec<String> {
        self.resource_url
            .split([' ', ','])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The `resource` parameter sent to token endpoints.
    pub fn resource_param(&self) -> String {
        self.resource_urls().join(",")
    }

    /// Deterministic content hash used as the session-store key.
    pub fn fingerprint(&self) -> String {
        let canonical =
            serde_json::to_string(self).expect("AuthConfig serialization is infallible");
        let digest = Sha256::digest(canonical.as_bytes());
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    pub(crate) fn has(value: &Option<String>) -> bool {
        value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

/// A logical remote service endpoint with its authentication choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub authentication: Option<AuthConfig>,
    #[serde(default)]
    pub fallback_authentications: Vec<AuthConfig>,
}

impl ServiceEndpoint {
    /// Primary authentication followed by fallbacks, in configured order.
    pub fn authentications(&self) -> Vec<AuthConfig> {
        let mut all = Vec::new();
        if let Some(primary) = &self.authentication {
            all.push(primary.clone());
        }
        all.extend(self.fallback_authentications.iter().cloned());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> AuthConfig {
        AuthConfig {
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
        }
    }

    #[test]
    fn test_grant_type_round_trip() {
        for wire in [
            GRANT_TYPE_CLIENT_CREDENTIALS,
            GRANT_TYPE_DEVICE_CODE,
            GRANT_TYPE_TOKEN_EXCHANGE,
            GRANT_TYPE_AUTHORIZATION_CODE,
            "urn:example:custom-grant",
        ] {
            let parsed = GrantType::from(wire);
            assert_eq!(parsed.as_str(), wire);
        }
    }

    #[test]
    fn test_token_exchange_does_not_support_refresh() {
        assert!(!GrantType::TokenExchange.supports_refresh());
        assert!(GrantType::ClientCredentials.supports_refresh());
        assert!(GrantType::DeviceCode.supports_refresh());
    }

    #[test]
    fn test_resource_urls_split_on_space_and_comma() {
        let mut config = sample_config();
        config.resource_url =
            "http://resource1.com http://resource2.com,http://resource3.com".to_string();
        assert_eq!(
            config.resource_urls(),
            vec![
                "http://resource1.com",
                "http://resource2.com",
                "http://resource3.com"
            ]
        );
        assert_eq!(
            config.resource_param(),
            "http://resource1.com,http://resource2.com,http://resource3.com"
        );
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let first = sample_config();
        let second = sample_config();
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let first = sample_config();
        let mut second = sample_config();
        second.client_id = Some("another-client".to_string());
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_endpoint_authentications_preserve_order() {
        let mut fallback = sample_config();
        fallback.grant_type = GrantType::DeviceCode;
        let endpoint = ServiceEndpoint {
            id: "collections".to_string(),
            url: "https://collections.example.com".to_string(),
            authentication: Some(sample_config()),
            fallback_authentications: vec![fallback.clone()],
        };
        let all = endpoint.authentications();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].grant_type, GrantType::ClientCredentials);
        assert_eq!(all[1].grant_type, GrantType::DeviceCode);
    }
}
