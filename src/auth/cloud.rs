//! Cloud metadata identity-token providers
//!
//! Inside a cloud compute instance, the platform's local metadata service can
//! mint short-lived identity tokens without any external network access. A
//! missing token is a recoverable condition here: every failure path degrades
//! to `None` with a warning, and it is the caller's business whether that is
//! fatal.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::TraceSpan;

pub const GCP_METADATA_BASE_URL: &str = "http://metadata.google.internal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudPlatform {
    Gcp,
}

impl CloudPlatform {
    pub fn name(&self) -> &'static str {
        match self {
            CloudPlatform::Gcp => "gcp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudMetadataConfig {
    /// Budget for the availability probe.
    pub probe_timeout: Duration,
    /// Budget for an identity-token fetch.
    pub token_timeout: Duration,
}

impl Default for CloudMetadataConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            token_timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
pub trait CloudIdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fast probe to confirm the process runs inside this cloud.
    async fn is_available(&self) -> bool;

    /// Fetch an identity token for the given audience. `None` on any failure.
    async fn get_identity_token(&self, audience: &str, trace: &TraceSpan) -> Option<String>;
}

pub struct GcpMetadataProvider {
    client: reqwest::Client,
    base_url: String,
    config: CloudMetadataConfig,
}

impl GcpMetadataProvider {
    pub fn new(config: CloudMetadataConfig) -> Self {
        Self::with_base_url(GCP_METADATA_BASE_URL, config)
    }

    /// Point the provider at an alternate metadata host (tests).
    pub fn with_base_url(base_url: impl Into<String>, config: CloudMetadataConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
            config,
        }
    }
}

#[async_trait]
impl CloudIdentityProvider for GcpMetadataProvider {
    fn name(&self) -> &'static str {
        CloudPlatform::Gcp.name()
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/computeMetadata/v1/project/project-id", self.base_url);
        match self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!("GCP metadata service is not reachable: {error}");
                false
            }
        }
    }

    async fn get_identity_token(&self, audience: &str, trace: &TraceSpan) -> Option<String> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/identity?audience={}&format=full",
            self.base_url,
            urlencoding::encode(audience),
        );

        let mut request = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .timeout(self.config.token_timeout);
        for (name, value) in trace.http_headers() {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(token) => Some(token.trim().to_string()),
                Err(error) => {
                    warn!("Failed to read identity token from cloud service: {error}");
                    None
                }
            },
            Ok(response) => {
                warn!("cloud service returned {}", response.status().as_u16());
                None
            }
            Err(error) => {
                warn!("Failed to fetch token from cloud service: {error}");
                None
            }
        }
    }
}

pub struct CloudProviderFactory;

impl CloudProviderFactory {
    pub fn create(
        platform: CloudPlatform,
        config: CloudMetadataConfig,
    ) -> Box<dyn CloudIdentityProvider> {
        match platform {
            CloudPlatform::Gcp => Box::new(GcpMetadataProvider::new(config)),
        }
    }

    /// Probe the known platforms and return the first that answers.
    pub async fn detect(config: &CloudMetadataConfig) -> Option<Box<dyn CloudIdentityProvider>> {
        let gcp = GcpMetadataProvider::new(config.clone());
        if gcp.is_available().await {
            debug!("Detected GCP metadata service");
            return Some(Box::new(gcp));
        }
        None
    }
}
