//! Client-credentials grant

use async_trait::async_trait;
use log::debug;

use super::{GrantAdapter, TokenResponse, read_token_response};
use crate::auth::error::AuthError;
use crate::auth::models::{AuthConfig, GRANT_TYPE_CLIENT_CREDENTIALS, GrantType};
use crate::http::TraceSpan;

pub struct ClientCredentialsAdapter {
    auth: AuthConfig,
    client: reqwest::Client,
}

impl ClientCredentialsAdapter {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            auth,
            client: crate::http::make_client(),
        }
    }

    pub fn is_compatible_with(auth: &AuthConfig) -> bool {
        auth.grant_type == GrantType::ClientCredentials
            && AuthConfig::has(&auth.token_endpoint)
            && AuthConfig::has(&auth.client_id)
            && AuthConfig::has(&auth.client_secret)
            && !auth.resource_urls().is_empty()
    }
}

#[async_trait]
impl GrantAdapter for ClientCredentialsAdapter {
    fn grant_type(&self) -> GrantType {
        GrantType::ClientCredentials
    }

    async fn acquire(&self, trace: &TraceSpan) -> Result<TokenResponse, AuthError> {
        let auth = &self.auth;
        let token_endpoint = auth.token_endpoint.as_deref().ok_or_else(|| {
            AuthError::grant("Client-credentials authentication requires a token endpoint")
        })?;
        let client_id = auth.client_id.as_deref().ok_or_else(|| {
            AuthError::grant("Client-credentials authentication requires a client id")
        })?;

        debug!(
            "[{}] Requesting client-credentials token from {} for {}",
            trace,
            token_endpoint,
            auth.resource_param(),
        );

        let mut params: Vec<(&str, String)> = vec![
            ("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS.to_string()),
            ("resource", auth.resource_param()),
        ];
        if let Some(scope) = &auth.scope {
            params.push(("scope", scope.clone()));
        }
        if let Some(audience) = &auth.audience {
            params.push(("audience", audience.clone()));
        }

        let mut request = self
            .client
            .post(token_endpoint)
            .basic_auth(client_id, auth.client_secret.as_deref())
            .form(&params);
        for (name, value) in trace.http_headers() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::grant_rejected(
                format!(
                    "Failed to acquire a token for {client_id} as the server responded with HTTP {}:\n\n{body}\n",
                    status.as_u16(),
                ),
                status.as_u16(),
                body,
            ));
        }

        read_token_response(response, "client-credentials authentication").await
    }
}
