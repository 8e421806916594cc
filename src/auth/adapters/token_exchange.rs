//! Token-exchange grant (RFC 8693)
//!
//! Trades a subject token for an access token issued by the configured
//! authorization server. Subject tokens are resolved in priority order: an
//! explicitly configured token, then a one-time platform token taken from the
//! active context, then an identity token minted by the local cloud metadata
//! service.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{GrantAdapter, SUBJECT_TOKEN_TYPE_JWT, TokenResponse, read_token_response};
use crate::auth::cloud::{
    CloudIdentityProvider, CloudMetadataConfig, CloudProviderFactory, GcpMetadataProvider,
};
use crate::auth::error::AuthError;
use crate::auth::models::{AuthConfig, GRANT_TYPE_TOKEN_EXCHANGE, GrantType};
use crate::auth::subject_token::SubjectTokenSource;
use crate::http::TraceSpan;

pub struct TokenExchangeAdapter {
    auth: AuthConfig,
    client: reqwest::Client,
    subject_source: Option<Arc<dyn SubjectTokenSource>>,
    cloud_config: CloudMetadataConfig,
    /// Filled on first use; `Some(None)` remembers a failed detection so the
    /// probe is not repeated for this adapter instance.
    cloud_provider: OnceCell<Option<Box<dyn CloudIdentityProvider>>>,
    metadata_base_url: Option<String>,
}

impl TokenExchangeAdapter {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            auth,
            client: crate::http::make_client(),
            subject_source: None,
            cloud_config: CloudMetadataConfig::default(),
            cloud_provider: OnceCell::new(),
            metadata_base_url: None,
        }
    }

    /// Attach the one-time platform subject-token source.
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

    pub fn is_compatible_with(auth: &AuthConfig) -> bool {
        auth.grant_type == GrantType::TokenExchange
            && AuthConfig::has(&auth.token_endpoint)
            && !auth.resource_urls().is_empty()
    }

    /// Audience for a minted identity token: explicit audience first, then
    /// the client id, then the resource URL.
    fn identity_token_audience(&self) -> Option<String> {
        if AuthConfig::has(&self.auth.audience) {
            return self.auth.audience.clone();
        }
        if AuthConfig::has(&self.auth.client_id) {
            return self.auth.client_id.clone();
        }
        self.auth.resource_urls().into_iter().next()
    }

    async fn take_context_subject_token(&self) -> Option<String> {
        let source = self.subject_source.as_ref()?;
        match source.take().await {
            Ok(token) => token,
            Err(error) => {
                warn!("Failed to read the platform subject token: {error}");
                None
            }
        }
    }

    async fn fetch_cloud_identity_token(
        &self,
        audience: &str,
        trace: &TraceSpan,
    ) -> Option<String> {
        let provider = self
            .cloud_provider
            .get_or_init(|| async {
                if let Some(base_url) = &self.metadata_base_url {
                    return Some(Box::new(GcpMetadataProvider::with_base_url(
                        base_url.clone(),
                        self.cloud_config.clone(),
                    )) as Box<dyn CloudIdentityProvider>);
                }
                if let Some(platform) = self.auth.cloud_platform {
                    return Some(CloudProviderFactory::create(
                        platform,
                        self.cloud_config.clone(),
                    ));
                }
                CloudProviderFactory::detect(&self.cloud_config).await
            })
            .await;

        match provider {
            Some(provider) => provider.get_identity_token(audience, trace).await,
            None => {
                warn!("No cloud provider detected; cannot mint an identity token");
                None
            }
        }
    }

    async fn resolve_subject_token(&self, trace: &TraceSpan) -> Result<String, AuthError> {
        if let Some(token) = self.auth.subject_token.as_deref() {
            if !token.trim().is_empty() {
                debug!("[{}] Using the explicitly configured subject token", trace);
                return Ok(token.to_string());
            }
        }

        if let Some(token) = self.take_context_subject_token().await {
            debug!("[{}] Using the one-time platform subject token", trace);
            return Ok(token);
        }

        if let Some(audience) = self.identity_token_audience() {
            if let Some(token) = self.fetch_cloud_identity_token(&audience, trace).await {
                debug!("[{}] Using an identity token minted by the cloud metadata service", trace);
                return Ok(token);
            }
        }

        Err(AuthError::grant(
            "No subject token provided and unable to fetch from cloud. \
             Please provide a subject token or run from a cloud environment.",
        ))
    }
}

#[async_trait]
impl GrantAdapter for TokenExchangeAdapter {
    fn grant_type(&self) -> GrantType {
        GrantType::TokenExchange
    }

    async fn acquire(&self, trace: &TraceSpan) -> Result<TokenResponse, AuthError> {
        let auth = &self.auth;
        let token_endpoint = auth
            .token_endpoint
            .as_deref()
            .ok_or_else(|| AuthError::grant("Token exchange requires a token endpoint"))?;
        let subject_token = self.resolve_subject_token(trace).await?;

        debug!(
            "[{}] Exchanging a subject token at {} for {}",
            trace,
            token_endpoint,
            auth.resource_param(),
        );

        let mut params: Vec<(&str, String)> = vec![
            ("grant_type", GRANT_TYPE_TOKEN_EXCHANGE.to_string()),
            ("subject_token_type", SUBJECT_TOKEN_TYPE_JWT.to_string()),
            ("subject_token", subject_token),
            ("resource", auth.resource_param()),
        ];
        if let Some(requested_token_type) = &auth.requested_token_type {
            params.push(("requested_token_type", requested_token_type.clone()));
        }
        if let Some(scope) = &auth.scope {
            params.push(("scope", scope.clone()));
        }

        let mut request = self.client.post(token_endpoint).form(&params);
        if let Some(client_id) = auth.client_id.as_deref() {
            request = request.basic_auth(client_id, auth.client_secret.as_deref());
        }
        for (name, value) in trace.http_headers() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let client_id = auth.client_id.as_deref().unwrap_or("(anonymous client)");
            return Err(AuthError::grant_rejected(
                format!(
                    "Failed to perform token exchange for {client_id} as the server responded with HTTP {}:\n\n{body}\n",
                    status.as_u16(),
                ),
                status.as_u16(),
                body,
            ));
        }

        read_token_response(response, "token exchange").await
    }
}
