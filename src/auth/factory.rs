//! Selection of grant adapters for authentication configurations

use log::debug;
use std::sync::Arc;

use super::adapters::{
    ClientCredentialsAdapter, DeviceCodeAdapter, GrantAdapter, TokenExchangeAdapter,
};
use super::authenticator::Authenticator;
use super::cloud::CloudMetadataConfig;
use super::events::{NullEventSink, SharedEventSink};
use super::models::{AuthConfig, ServiceEndpoint};
use super::store::SessionStore;
use super::subject_token::SubjectTokenSource;

/// Builds the adapter matching a configuration's grant type, and from there
/// the authenticators for a set of endpoints.
///
/// The adapter set is closed: a configuration either matches one of the
/// registered grants with all of that grant's required fields present, or it
/// is dropped.
#[derive(Clone)]
pub struct AdapterFactory {
    events: SharedEventSink,
    subject_source: Option<Arc<dyn SubjectTokenSource>>,
    cloud_config: CloudMetadataConfig,
    metadata_base_url: Option<String>,
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self {
            events: Arc::new(NullEventSink),
            subject_source: None,
            cloud_config: CloudMetadataConfig::default(),
            metadata_base_url: None,
        }
    }

    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_subject_source(mut self, source: Arc<dyn SubjectTokenSource>) -> Self {
        self.subject_source = Some(source);
        self
    }

    pub fn with_cloud_config(mut self, config: CloudMetadataConfig) -> Self {
        self.cloud_config = config;
        self
    }

    /// Point cloud metadata lookups at an alternate host (tests).
    pub fn with_metadata_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.metadata_base_url = Some(base_url.into());
        self
    }

    pub fn events(&self) -> SharedEventSink {
        self.events.clone()
    }

    /// Whether some registered adapter can execute this configuration.
    pub fn is_supported(config: &AuthConfig) -> bool {
        ClientCredentialsAdapter::is_compatible_with(config)
            || DeviceCodeAdapter::is_compatible_with(config)
            || TokenExchangeAdapter::is_compatible_with(config)
    }

    /// Predicate scan over the closed adapter set.
    pub fn adapter_for(&self, config: &AuthConfig) -> Option<Box<dyn GrantAdapter>> {
        if ClientCredentialsAdapter::is_compatible_with(config) {
            return Some(Box::new(ClientCredentialsAdapter::new(config.clone())));
        }
        if DeviceCodeAdapter::is_compatible_with(config) {
            return Some(Box::new(DeviceCodeAdapter::new(
                config.clone(),
                self.events.clone(),
            )));
        }
        if TokenExchangeAdapter::is_compatible_with(config) {
            let mut adapter = TokenExchangeAdapter::new(config.clone())
                .with_cloud_config(self.cloud_config.clone());
            if let Some(source) = &self.subject_source {
                adapter = adapter.with_subject_source(source.clone());
            }
            if let Some(base_url) = &self.metadata_base_url {
                adapter = adapter.with_metadata_base_url(base_url.clone());
            }
            return Some(Box::new(adapter));
        }
        None
    }

    /// One authenticator per supported configuration, in endpoint order with
    /// each endpoint's primary configuration before its fallbacks.
    ///
    /// Configurations with an unsupported grant are dropped without error; an
    /// endpoint whose configurations are all dropped simply contributes no
    /// authenticators and its requests go out unauthenticated.
    pub fn create_multiple_from(
        &self,
        endpoints: &[ServiceEndpoint],
        store: Arc<dyn SessionStore>,
    ) -> Vec<Authenticator> {
        let mut authenticators = Vec::new();
        for endpoint in endpoints {
            for config in endpoint.authentications() {
                if Self::is_supported(&config) {
                    authenticators.push(Authenticator::new(
                        Some(endpoint.id.clone()),
                        config,
                        store.clone(),
                        self.clone(),
                    ));
                } else {
                    debug!(
                        "Dropping authentication with unsupported grant '{}' for endpoint '{}'",
                        config.grant_type, endpoint.id,
                    );
                }
            }
        }
        authenticators
    }
}

impl Default for AdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::GrantType;
    use crate::auth::store::MemorySessionStore;

    fn config(grant_type: GrantType) -> AuthConfig {
        AuthConfig {
            grant_type,
            token_endpoint: Some("https://auth.example.com/oauth/token".to_string()),
            device_code_endpoint: Some("https://auth.example.com/oauth/device/code".to_string()),
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
    fn test_adapter_for_matches_grant_type() {
        let factory = AdapterFactory::new();
        for grant_type in [
            GrantType::ClientCredentials,
            GrantType::DeviceCode,
            GrantType::TokenExchange,
        ] {
            let adapter = factory.adapter_for(&config(grant_type.clone())).unwrap();
            assert_eq!(adapter.grant_type(), grant_type);
        }
    }

    #[test]
    fn test_authorization_code_has_no_adapter() {
        let factory = AdapterFactory::new();
        assert!(factory.adapter_for(&config(GrantType::AuthorizationCode)).is_none());
        assert!(!AdapterFactory::is_supported(&config(GrantType::AuthorizationCode)));
    }

    #[test]
    fn test_unsupported_grants_are_filtered_out() {
        let endpoints = vec![
            ServiceEndpoint {
                id: "collections".to_string(),
                url: "https://collections.example.com".to_string(),
                authentication: Some(config(GrantType::DeviceCode)),
                fallback_authentications: vec![
                    config(GrantType::AuthorizationCode),
                    config(GrantType::ClientCredentials),
                ],
            },
            ServiceEndpoint {
                id: "workbench".to_string(),
                url: "https://workbench.example.com".to_string(),
                authentication: Some(config(GrantType::AuthorizationCode)),
                fallback_authentications: vec![],
            },
        ];

        let factory = AdapterFactory::new();
        let authenticators =
            factory.create_multiple_from(&endpoints, Arc::new(MemorySessionStore::new()));

        // device-code and client-credentials survive; both
        // authorization-code configurations are silently dropped, leaving the
        // workbench endpoint with no authenticators at all.
        assert_eq!(authenticators.len(), 2);
        assert_eq!(authenticators[0].auth().grant_type, GrantType::DeviceCode);
        assert_eq!(
            authenticators[1].auth().grant_type,
            GrantType::ClientCredentials
        );
        assert!(
            authenticators
                .iter()
                .all(|a| a.endpoint_id() == Some("collections"))
        );
    }

    #[test]
    fn test_all_supported_grants_pass_through() {
        let endpoints = vec![
            ServiceEndpoint {
                id: "a".to_string(),
                url: "https://a.example.com".to_string(),
                authentication: Some(config(GrantType::DeviceCode)),
                fallback_authentications: vec![],
            },
            ServiceEndpoint {
                id: "b".to_string(),
                url: "https://b.example.com".to_string(),
                authentication: Some(config(GrantType::ClientCredentials)),
                fallback_authentications: vec![],
            },
            ServiceEndpoint {
                id: "c".to_string(),
                url: "https://c.example.com".to_string(),
                authentication: Some(config(GrantType::TokenExchange)),
                fallback_authentications: vec![],
            },
        ];

        let factory = AdapterFactory::new();
        let authenticators =
            factory.create_multiple_from(&endpoints, Arc::new(MemorySessionStore::new()));
        assert_eq!(authenticators.len(), 3);
    }

    #[test]
    fn test_missing_required_field_drops_config() {
        let mut incomplete = config(GrantType::ClientCredentials);
        incomplete.client_secret = None;
        let endpoints = vec![ServiceEndpoint {
            id: "collections".to_string(),
            url: "https://collections.example.com".to_string(),
            authentication: Some(incomplete),
            fallback_authentications: vec![],
        }];

        let factory = AdapterFactory::new();
        let authenticators =
            factory.create_multiple_from(&endpoints, Arc::new(MemorySessionStore::new()));
        assert!(authenticators.is_empty());
    }
}
