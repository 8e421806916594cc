//! Device-code grant (RFC 8628)
//!
//! Requests a device/user code pair, surfaces the verification URI through
//! the event sink, then polls the token endpoint at the server-provided
//! interval until the user completes verification or the code expires.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use super::{GrantAdapter, OAuthErrorResponse, TokenResponse, read_token_response};
use crate::auth::error::AuthError;
use crate::auth::events::{AuthEvent, SharedEventSink};
use crate::auth::models::{AuthConfig, GRANT_TYPE_DEVICE_CODE, GrantType};
use crate::http::TraceSpan;

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    expires_in: u64,
    #[serde(default = "default_poll_interval")]
    interval: u64,
}

fn default_poll_interval() -> u64 {
    5
}

pub struct DeviceCodeAdapter {
    auth: AuthConfig,
    client: reqwest::Client,
    events: SharedEventSink,
}

impl DeviceCodeAdapter {
    pub fn new(auth: AuthConfig, events: SharedEventSink) -> Self {
        Self {
            auth,
            client: crate::http::make_client(),
            events,
        }
    }

    pub fn is_compatible_with(auth: &AuthConfig) -> bool {
        auth.grant_type == GrantType::DeviceCode
            && AuthConfig::has(&auth.device_code_endpoint)
            && AuthConfig::has(&auth.token_endpoint)
            && AuthConfig::has(&auth.client_id)
            && !auth.resource_urls().is_empty()
    }

    async fn request_device_code(
        &self,
        trace: &TraceSpan,
    ) -> Result<DeviceCodeResponse, AuthError> {
        let auth = &self.auth;
        let device_code_endpoint = auth.device_code_endpoint.as_deref().ok_or_else(|| {
            AuthError::grant("Device-code authentication requires a device-code endpoint")
        })?;
        let client_id = auth
            .client_id
            .as_deref()
            .ok_or_else(|| AuthError::grant("Device-code authentication requires a client id"))?;

        let params: Vec<(&str, String)> = vec![
            ("grant_type", GRANT_TYPE_DEVICE_CODE.to_string()),
            ("client_id", client_id.to_string()),
            ("resource", auth.resource_param()),
        ];

        let mut request = self.client.post(device_code_endpoint).form(&params);
        for (name, value) in trace.http_headers() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::grant_rejected(
                format!(
                    "Failed to initiate device authorization for {client_id} as the server responded with HTTP {}:\n\n{body}\n",
                    status.as_u16(),
                ),
                status.as_u16(),
                body,
            ));
        }

        let body = response.text().await.unwrap_or_default();
        serde_json::from_str(&body).map_err(|error| {
            AuthError::grant(format!(
                "Device authorization returned an unparseable response ({error})"
            ))
        })
    }
}

#[async_trait]
impl GrantAdapter for DeviceCodeAdapter {
    fn grant_type(&self) -> GrantType {
        GrantType::DeviceCode
    }

    async fn acquire(&self, trace: &TraceSpan) -> Result<TokenResponse, AuthError> {
        let auth = &self.auth;
        let token_endpoint = auth.token_endpoint.as_deref().ok_or_else(|| {
            AuthError::grant("Device-code authentication requires a token endpoint")
        })?;
        let client_id = auth
            .client_id
            .as_deref()
            .ok_or_else(|| AuthError::grant("Device-code authentication requires a client id"))?;

        let device = self.request_device_code(trace).await?;

        self.events.on_event(&AuthEvent::DeviceAuthorization {
            verification_uri: device
                .verification_uri_complete
                .clone()
                .unwrap_or_else(|| device.verification_uri.clone()),
            user_code: device.user_code.clone(),
            expires_in: device.expires_in,
        });

        let deadline = Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = device.interval;

        loop {
            if Instant::now() >= deadline {
                return Err(AuthError::grant(
                    "Device authorization expired before the user completed verification",
                ));
            }
            tokio::time::sleep(Duration::from_secs(interval)).await;

            let params: Vec<(&str, String)> = vec![
                ("grant_type", GRANT_TYPE_DEVICE_CODE.to_string()),
                ("device_code", device.device_code.clone()),
                ("client_id", client_id.to_string()),
            ];
            let mut request = self.client.post(token_endpoint).form(&params);
            for (name, value) in trace.http_headers() {
                request = request.header(name, value);
            }

            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return read_token_response(response, "device-code authentication").await;
            }

            let body = response.text().await.unwrap_or_default();
            let error = OAuthErrorResponse::parse(&body);
            match error.error.as_deref() {
                Some("authorization_pending") => {
                    debug!("[{}] Device authorization still pending", trace);
                }
                Some("slow_down") => {
                    interval += 5;
                    debug!("[{}] Server asked to slow polling down to {}s", trace, interval);
                }
                _ => {
                    return Err(AuthError::grant_rejected(
                        format!(
                            "Device authorization failed for {client_id} as the server responded with HTTP {}:\n\n{body}\n",
                            status.as_u16(),
                        ),
                        status.as_u16(),
                        body,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compatible_config() -> AuthConfig {
        AuthConfig {
            grant_type: GrantType::DeviceCode,
            token_endpoint: Some("https://auth.example.com/oauth/token".to_string()),
            device_code_endpoint: Some("https://auth.example.com/oauth/device/code".to_string()),
            resource_url: "https://collections.example.com".to_string(),
            client_id: Some("atlas-device-client".to_string()),
            client_secret: None,
            scope: None,
            audience: None,
            subject_token: None,
            requested_token_type: None,
            cloud_platform: None,
        }
    }

    #[test]
    fn test_compatible_without_client_secret() {
        // Device-code clients are public clients.
        assert!(DeviceCodeAdapter::is_compatible_with(&compatible_config()));
    }

    #[test]
    fn test_incompatible_without_device_code_endpoint() {
        let mut config = compatible_config();
        config.device_code_endpoint = None;
        assert!(!DeviceCodeAdapter::is_compatible_with(&config));
    }

    #[test]
    fn test_incompatible_with_wrong_grant_type() {
        let mut config = compatible_config();
        config.grant_type = GrantType::AuthorizationCode;
        assert!(!DeviceCodeAdapter::is_compatible_with(&config));
    }
}
