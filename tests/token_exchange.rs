//! Integration tests for the token-exchange adapter

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atlas_cli::auth::adapters::{GrantAdapter, TokenExchangeAdapter};
use atlas_cli::auth::error::AuthError;
use atlas_cli::auth::models::{AuthConfig, GrantType};
use atlas_cli::auth::subject_token::{PlatformTokenCell, SubjectTokenSource as _};
use atlas_cli::http::TraceSpan;

const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";

fn exchange_config(token_endpoint: &str) -> AuthConfig {
    AuthConfig {
        grant_type: GrantType::TokenExchange,
        token_endpoint: Some(token_endpoint.to_string()),
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

fn token_response() -> serde_json::Value {
    serde_json::json!({
        "access_token": "exchanged-access-token",
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "read write",
    })
}

#[tokio::test]
async fn test_exchange_with_provided_subject_token() {
    let server = MockServer::start().await;
    let expected_basic = format!("Basic {}", STANDARD.encode("atlas-client:s3cret"));
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("authorization", expected_basic.as_str()))
        .and(body_string_contains("token-exchange"))
        .and(body_string_contains("subject_token=subject-jwt"))
        .and(body_string_contains("token-type%3Ajwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response()))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = exchange_config(&format!("{}/oauth/token", server.uri()));
    config.subject_token = Some("subject-jwt".to_string());

    let adapter = TokenExchangeAdapter::new(config);
    let response = adapter.acquire(&TraceSpan::new()).await.unwrap();
    assert_eq!(response.access_token, "exchanged-access-token");
    assert_eq!(response.expires_in, 3600);
}

#[tokio::test]
async fn test_exchange_passes_optional_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("scope=read+write+admin"))
        .and(body_string_contains("requested_token_type="))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response()))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = exchange_config(&format!("{}/oauth/token", server.uri()));
    config.subject_token = Some("subject-jwt".to_string());
    config.scope = Some("read write admin".to_string());
    config.requested_token_type =
        Some("urn:ietf:params:oauth:token-type:access_token".to_string());

    let adapter = TokenExchangeAdapter::new(config);
    adapter.acquire(&TraceSpan::new()).await.unwrap();
}

#[tokio::test]
async fn test_exchange_joins_multiple_resource_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        // "http://resource1.com,http://resource2.com,http://resource3.com" form-encoded
        .and(body_string_contains("resource1.com%2Chttp"))
        .and(body_string_contains("resource3.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response()))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = exchange_config(&format!("{}/oauth/token", server.uri()));
    config.resource_url =
        "http://resource1.com http://resource2.com,http://resource3.com".to_string();
    config.subject_token = Some("subject-jwt".to_string());

    let adapter = TokenExchangeAdapter::new(config);
    adapter.acquire(&TraceSpan::new()).await.unwrap();
}

#[tokio::test]
async fn test_exchange_fetches_identity_token_from_cloud_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(IDENTITY_PATH))
        .and(query_param("audience", "atlas-client"))
        .and(query_param("format", "full"))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  cloud-identity-jwt\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("subject_token=cloud-identity-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response()))
        .expect(1)
        .mount(&server)
        .await;

    // No explicit subject token and no audience: the client id is the
    // fallback audience for the minted identity token.
    let config = exchange_config(&format!("{}/oauth/token", server.uri()));
    let adapter = TokenExchangeAdapter::new(config).with_metadata_base_url(server.uri());

    let response = adapter.acquire(&TraceSpan::new()).await.unwrap();
    assert_eq!(response.access_token, "exchanged-access-token");
}

#[tokio::test]
async fn test_explicit_audience_takes_priority_for_identity_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(IDENTITY_PATH))
        .and(query_param("audience", "https://passport.example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string("cloud-identity-jwt"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response()))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = exchange_config(&format!("{}/oauth/token", server.uri()));
    config.audience = Some("https://passport.example.com".to_string());

    let adapter = TokenExchangeAdapter::new(config).with_metadata_base_url(server.uri());
    adapter.acquire(&TraceSpan::new()).await.unwrap();
}

#[tokio::test]
async fn test_context_token_is_consumed_when_no_explicit_token_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("subject_token=one-time-platform-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response()))
        .expect(1)
        .mount(&server)
        .await;

    let cell = Arc::new(PlatformTokenCell::with_token("one-time-platform-jwt"));
    let config = exchange_config(&format!("{}/oauth/token", server.uri()));
    let adapter = TokenExchangeAdapter::new(config).with_subject_source(cell.clone());

    adapter.acquire(&TraceSpan::new()).await.unwrap();

    // Consumed: a second take finds nothing.
    assert_eq!(cell.take().await.unwrap(), None);
}

#[tokio::test]
async fn test_no_subject_token_and_metadata_404_is_a_grant_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(IDENTITY_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .expect(1)
        .mount(&server)
        .await;

    let config = exchange_config(&format!("{}/oauth/token", server.uri()));
    let adapter = TokenExchangeAdapter::new(config).with_metadata_base_url(server.uri());

    let error = adapter.acquire(&TraceSpan::new()).await.unwrap_err();
    let message = error.to_string();
    assert!(message.contains("No subject token provided"));
    assert!(message.contains("unable to fetch from cloud"));
}

#[tokio::test]
async fn test_token_endpoint_rejection_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("Invalid subject token or client credentials"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = exchange_config(&format!("{}/oauth/token", server.uri()));
    config.subject_token = Some("subject-jwt".to_string());

    let adapter = TokenExchangeAdapter::new(config);
    let error = adapter.acquire(&TraceSpan::new()).await.unwrap_err();
    match &error {
        AuthError::Grant { message, status, body } => {
            assert!(message.contains("Failed to perform token exchange"));
            assert!(message.contains("401"));
            assert_eq!(*status, Some(401));
            assert!(
                body.as_deref()
                    .is_some_and(|b| b.contains("Invalid subject token"))
            );
        }
        other => panic!("expected Grant error, got {other:?}"),
    }
}
