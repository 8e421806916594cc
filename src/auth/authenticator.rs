//! Per-endpoint credential lifecycle
//!
//! An authenticator owns exactly one authentication configuration and the
//! session acquired for it. It moves through
//! `Uninitialized -> Authenticating -> Ready -> (Refreshing |
//! ReauthenticationRequired) -> Ready | Revoked`, persisting every session
//! change through the store so the credential survives process restarts.

use log::debug;
use serde::Serialize;
use std::sync::{Arc, RwLock};

use super::adapters::{OAuthErrorResponse, read_token_response};
use super::error::AuthError;
use super::events::{AuthEvent, SharedEventSink};
use super::factory::AdapterFactory;
use super::models::AuthConfig;
use super::session::SessionRecord;
use super::store::SessionStore;
use crate::http::TraceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Authenticating,
    Ready,
    Refreshing,
    ReauthenticationRequired,
    Revoked,
}

impl AuthState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Uninitialized => "uninitialized",
            AuthState::Authenticating => "authenticating",
            AuthState::Ready => "ready",
            AuthState::Refreshing => "refreshing",
            AuthState::ReauthenticationRequired => "reauthentication required",
            AuthState::Revoked => "revoked",
        }
    }
}

/// Snapshot of one authenticator for status output.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStateReport {
    pub endpoint_id: Option<String>,
    pub resource_url: String,
    pub grant_type: String,
    pub state: String,
    pub token_preview: Option<String>,
    pub scope: Option<String>,
    pub valid_until: Option<String>,
}

pub struct Authenticator {
    endpoint_id: Option<String>,
    auth: AuthConfig,
    fingerprint: String,
    store: Arc<dyn SessionStore>,
    factory: AdapterFactory,
    events: SharedEventSink,
    client: reqwest::Client,
    state: RwLock<AuthState>,
    cached: tokio::sync::RwLock<Option<SessionRecord>>,
}

impl Authenticator {
    pub fn new(
        endpoint_id: Option<String>,
        auth: AuthConfig,
        store: Arc<dyn SessionStore>,
        factory: AdapterFactory,
    ) -> Self {
        let fingerprint = auth.fingerprint();
        let events = factory.events();
        Self {
            endpoint_id,
            auth,
            fingerprint,
            store,
            factory,
            events,
            client: crate::http::make_client(),
            state: RwLock::new(AuthState::Uninitialized),
            cached: tokio::sync::RwLock::new(None),
        }
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        self.endpoint_id.as_deref()
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// The session-store key for this configuration.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn state(&self) -> AuthState {
        *self.state.read().expect("authenticator state lock poisoned")
    }

    fn set_state(&self, state: AuthState) {
        *self.state.write().expect("authenticator state lock poisoned") = state;
    }

    /// The most recently seen session, for diagnostics only.
    pub async fn last_known_session(&self) -> Option<SessionRecord> {
        self.cached.read().await.clone()
    }

    /// Load the persisted session for this configuration, if any.
    pub async fn restore_session(&self) -> Result<Option<SessionRecord>, AuthError> {
        let restored = self.store.restore(&self.fingerprint).await?;
        if let Some(record) = &restored {
            self.events.on_event(&AuthEvent::SessionRestored {
                endpoint_id: self.endpoint_id.clone(),
            });
            *self.cached.write().await = Some(record.clone());
        }
        Ok(restored)
    }

    /// Run the full acquisition protocol for this configuration.
    pub async fn authenticate(&self, trace: &TraceSpan) -> Result<SessionRecord, AuthError> {
        self.set_state(AuthState::Authenticating);
        self.events.on_event(&AuthEvent::AuthBegin {
            endpoint_id: self.endpoint_id.clone(),
            resource_url: self.auth.resource_url.clone(),
        });

        let adapter = self
            .factory
            .adapter_for(&self.auth)
            .ok_or_else(|| AuthError::UnsupportedGrant(self.auth.grant_type.clone()))?;

        match adapter.acquire(trace).await {
            Ok(response) => {
                let record = SessionRecord::from_token_response(&self.auth, &response);
                self.store.save(&self.fingerprint, &record).await?;
                *self.cached.write().await = Some(record.clone());
                self.set_state(AuthState::Ready);
                self.events.on_event(&AuthEvent::AuthEnd {
                    endpoint_id: self.endpoint_id.clone(),
                    ok: true,
                });
                Ok(record)
            }
            Err(error) => {
                self.set_state(AuthState::ReauthenticationRequired);
                self.events.on_event(&AuthEvent::AuthEnd {
                    endpoint_id: self.endpoint_id.clone(),
                    ok: false,
                });
                Err(error)
            }
        }
    }

    /// Renew the persisted session.
    ///
    /// Sessions without a refresh token (token-exchange sessions in
    /// particular) are re-derived through the full acquisition protocol. A
    /// refresh token with no token endpoint, or one the server reports as
    /// expired, ends in [`AuthError::ReauthenticationRequired`].
    pub async fn refresh(&self, trace: &TraceSpan) -> Result<SessionRecord, AuthError> {
        self.events.on_event(&AuthEvent::RefreshBefore {
            endpoint_id: self.endpoint_id.clone(),
        });
        self.set_state(AuthState::Refreshing);

        let existing = match self.store.restore(&self.fingerprint).await? {
            Some(record) => record,
            None => {
                return Err(self.refresh_failure("No existing session to refresh"));
            }
        };

        let refresh_token = match &existing.refresh_token {
            Some(token) if self.auth.grant_type.supports_refresh() => token.clone(),
            _ => {
                // Normal for token-exchange sessions: no refresh token is
                // ever issued, so derive a whole new session instead.
                self.events.on_event(&AuthEvent::NoRefreshToken {
                    endpoint_id: self.endpoint_id.clone(),
                });
                return self.authenticate(trace).await;
            }
        };

        let token_endpoint = match self.auth.token_endpoint.as_deref() {
            Some(endpoint) if !endpoint.trim().is_empty() => endpoint.to_string(),
            _ => {
                return Err(self.refresh_failure(
                    "Re-authentication required as the client cannot request a new token \
                     without the token endpoint defined",
                ));
            }
        };

        debug!(
            "[{}] Refreshing the session for {} via {}",
            trace, self.auth.resource_url, token_endpoint,
        );

        let mut params: Vec<(&str, String)> = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
        ];
        if let Some(scope) = &existing.scope {
            params.push(("scope", scope.clone()));
        }

        let mut request = self.client.post(&token_endpoint).form(&params);
        if let Some(client_id) = self.auth.client_id.as_deref() {
            request = request.basic_auth(client_id, self.auth.client_secret.as_deref());
        }
        for (name, value) in trace.http_headers() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let description = OAuthErrorResponse::parse(&body)
                .error_description
                .unwrap_or_default();
            if description.to_lowercase().contains("expired") {
                return Err(self.refresh_failure(format!("Refresh token expired: {description}")));
            }

            self.set_state(AuthState::ReauthenticationRequired);
            self.events.on_event(&AuthEvent::RefreshFailure {
                endpoint_id: self.endpoint_id.clone(),
                reason: format!("HTTP {}", status.as_u16()),
            });
            return Err(AuthError::grant_rejected(
                format!(
                    "Failed to refresh the session as the server responded with HTTP {}:\n\n{body}\n",
                    status.as_u16(),
                ),
                status.as_u16(),
                body,
            ));
        }

        let token_response = read_token_response(response, "session refresh").await?;
        let mut record = SessionRecord::from_token_response(&self.auth, &token_response);
        if record.refresh_token.is_none() {
            // The server may rotate the refresh token or keep it; retain the
            // old one when none comes back.
            record.refresh_token = Some(refresh_token);
        }
        self.store.save(&self.fingerprint, &record).await?;
        *self.cached.write().await = Some(record.clone());
        self.set_state(AuthState::Ready);
        self.events.on_event(&AuthEvent::RefreshOk {
            endpoint_id: self.endpoint_id.clone(),
        });
        Ok(record)
    }

    fn refresh_failure(&self, reason: impl Into<String>) -> AuthError {
        let reason = reason.into();
        self.set_state(AuthState::ReauthenticationRequired);
        self.events.on_event(&AuthEvent::RefreshFailure {
            endpoint_id: self.endpoint_id.clone(),
            reason: reason.clone(),
        });
        AuthError::reauthentication_required(reason)
    }

    /// Null the access token on the persisted session, keeping the refresh
    /// token, so the next request must derive a fresh one. Idempotent.
    pub async fn clear_access_token(&self) -> Result<(), AuthError> {
        if let Some(mut record) = self.store.restore(&self.fingerprint).await? {
            record.access_token = None;
            self.store.save(&self.fingerprint, &record).await?;
        }
        *self.cached.write().await = None;
        Ok(())
    }

    /// Delete the persisted session. Idempotent; the authenticator fails
    /// closed afterwards.
    pub async fn revoke(&self) -> Result<(), AuthError> {
        self.store.delete(&self.fingerprint).await?;
        *self.cached.write().await = None;
        self.set_state(AuthState::Revoked);
        self.events.on_event(&AuthEvent::SessionRevoked {
            endpoint_id: self.endpoint_id.clone(),
        });
        Ok(())
    }

    /// Make sure a usable session exists, authenticating or refreshing as
    /// needed, and return it.
    pub async fn ensure_ready(&self, trace: &TraceSpan) -> Result<SessionRecord, AuthError> {
        if self.state() == AuthState::Revoked {
            return Err(AuthError::reauthentication_required(
                "The session has been revoked",
            ));
        }

        if let Some(cached) = self.cached.read().await.clone() {
            if cached.has_access_token() && cached.is_valid() {
                return Ok(cached);
            }
        }

        match self.store.restore(&self.fingerprint).await? {
            Some(record) if record.has_access_token() && record.is_valid() => {
                *self.cached.write().await = Some(record.clone());
                self.set_state(AuthState::Ready);
                self.events.on_event(&AuthEvent::SessionRestored {
                    endpoint_id: self.endpoint_id.clone(),
                });
                Ok(record)
            }
            Some(_) => self.refresh(trace).await,
            None => self.authenticate(trace).await,
        }
    }

    /// Attach the bearer token for a Ready session to an outgoing request.
    pub async fn before_request(
        &self,
        builder: reqwest::RequestBuilder,
        trace: &TraceSpan,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        let session = self.ensure_ready(trace).await?;
        let token = session.access_token.ok_or_else(|| {
            AuthError::reauthentication_required("The session has no access token")
        })?;
        Ok(builder.bearer_auth(token))
    }

    pub async fn state_report(&self) -> Result<AuthStateReport, AuthError> {
        let session = self.store.restore(&self.fingerprint).await?;
        let state = if self.state() == AuthState::Revoked {
            "revoked".to_string()
        } else {
            match &session {
                None => "not authenticated".to_string(),
                Some(record) if record.has_access_token() && record.is_valid() => {
                    "ready".to_string()
                }
                Some(_) => "session expired".to_string(),
            }
        };

        Ok(AuthStateReport {
            endpoint_id: self.endpoint_id.clone(),
            resource_url: self.auth.resource_url.clone(),
            grant_type: self.auth.grant_type.to_string(),
            state,
            token_preview: session.as_ref().and_then(|record| record.token_preview()),
            scope: session.as_ref().and_then(|record| record.scope.clone()),
            valid_until: session.as_ref().and_then(|record| {
                chrono::DateTime::from_timestamp(record.valid_until, 0)
                    .map(|timestamp| timestamp.to_rfc3339())
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::adapters::TokenResponse;
    use crate::auth::models::GrantType;
    use crate::auth::session::now_unix;
    use crate::auth::store::MemorySessionStore;

    fn client_credentials_config() -> AuthConfig {
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

    fn authenticator_with(
        config: AuthConfig,
        store: Arc<MemorySessionStore>,
    ) -> Authenticator {
        Authenticator::new(
            Some("collections".to_string()),
            config,
            store,
            AdapterFactory::new(),
        )
    }

    async fn seed_session(
        store: &MemorySessionStore,
        config: &AuthConfig,
        refresh_token: Option<&str>,
    ) -> SessionRecord {
        let mut record = SessionRecord::from_token_response(
            config,
            &TokenResponse {
                access_token: "atk-1".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 3600,
                refresh_token: refresh_token.map(str::to_string),
                scope: None,
            },
        );
        record.issued_at = now_unix() - 7200;
        record.valid_until = now_unix() - 3600;
        store.save(&config.fingerprint(), &record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_refresh_without_session_requires_reauthentication() {
        let store = Arc::new(MemorySessionStore::new());
        let authenticator = authenticator_with(client_credentials_config(), store);

        let error = authenticator.refresh(&TraceSpan::new()).await.unwrap_err();
        assert!(matches!(error, AuthError::ReauthenticationRequired { .. }));
        assert_eq!(authenticator.state(), AuthState::ReauthenticationRequired);
    }

    #[tokio::test]
    async fn test_refresh_without_token_endpoint_requires_reauthentication() {
        let mut config = client_credentials_config();
        config.token_endpoint = None;
        let store = Arc::new(MemorySessionStore::new());
        seed_session(&store, &config, Some("rtk-1")).await;

        let authenticator = authenticator_with(config, store);
        let error = authenticator.refresh(&TraceSpan::new()).await.unwrap_err();
        match error {
            AuthError::ReauthenticationRequired { reason } => {
                assert!(reason.contains("without the token endpoint defined"));
            }
            other => panic!("expected ReauthenticationRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clear_access_token_keeps_refresh_token() {
        let config = client_credentials_config();
        let store = Arc::new(MemorySessionStore::new());
        seed_session(&store, &config, Some("rtk-1")).await;

        let fingerprint = config.fingerprint();
        let authenticator = authenticator_with(config, store.clone());
        authenticator.clear_access_token().await.unwrap();

        let record = store.restore(&fingerprint).await.unwrap().unwrap();
        assert!(record.access_token.is_none());
        assert_eq!(record.refresh_token.as_deref(), Some("rtk-1"));
    }

    #[tokio::test]
    async fn test_clear_access_token_without_session_is_noop() {
        let store = Arc::new(MemorySessionStore::new());
        let authenticator = authenticator_with(client_credentials_config(), store);
        authenticator.clear_access_token().await.unwrap();
        authenticator.clear_access_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_twice_is_noop() {
        let config = client_credentials_config();
        let store = Arc::new(MemorySessionStore::new());
        seed_session(&store, &config, None).await;

        let fingerprint = config.fingerprint();
        let authenticator = authenticator_with(config, store.clone());
        authenticator.revoke().await.unwrap();
        assert!(store.restore(&fingerprint).await.unwrap().is_none());
        authenticator.revoke().await.unwrap();
        assert_eq!(authenticator.state(), AuthState::Revoked);
    }

    #[tokio::test]
    async fn test_before_request_fails_closed_after_revoke() {
        let config = client_credentials_config();
        let store = Arc::new(MemorySessionStore::new());
        seed_session(&store, &config, None).await;

        let authenticator = authenticator_with(config, store);
        authenticator.revoke().await.unwrap();

        let error = authenticator
            .ensure_ready(&TraceSpan::new())
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::ReauthenticationRequired { .. }));
    }

    #[tokio::test]
    async fn test_restore_session_returns_none_when_absent() {
        let store = Arc::new(MemorySessionStore::new());
        let authenticator = authenticator_with(client_credentials_config(), store);
        assert!(authenticator.restore_session().await.unwrap().is_none());
        assert_eq!(authenticator.state(), AuthState::Uninitialized);
    }

    #[tokio::test]
    async fn test_state_report_labels() {
        let config = client_credentials_config();
        let store = Arc::new(MemorySessionStore::new());
        let authenticator = authenticator_with(config.clone(), store.clone());

        let report = authenticator.state_report().await.unwrap();
        assert_eq!(report.state, "not authenticated");
        assert_eq!(report.grant_type, "client_credentials");

        seed_session(&store, &config, Some("rtk-1")).await;
        let report = authenticator.state_report().await.unwrap();
        assert_eq!(report.state, "session expired");
    }
}
