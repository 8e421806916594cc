//! Request submission with the 401 reauthentication cascade
//!
//! A session sends requests decorated by its ordered list of authenticators.
//! On a 401 the active authenticator's token is cleared and the request is
//! retried, first forcing reauthentication on the same authenticator, then
//! advancing to the next configured one. With N authenticators a persistently
//! rejected request is sent at most 2N times before the session gives up.

use std::fmt;

use log::{debug, error};
use reqwest::Method;
use uuid::Uuid;

use super::error::HttpError;
use super::trace::TraceSpan;
use crate::auth::Authenticator;
use crate::auth::session::decode_claims_unverified;

/// One failed attempt during a single `submit` call tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryHistoryEntry {
    pub url: String,
    pub authenticator_index: usize,
    pub with_reauthentication: bool,
    pub with_next_authenticator: bool,
    pub encountered_http_status: u16,
    pub encountered_http_response: String,
    pub resolution: String,
}

impl fmt::Display for RetryHistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ">>> Auth #{}\n>>> reauth: {}\n>>> use_next: {}\n\nHTTP {}\n\n{}\n\n[ -> {}]",
            self.authenticator_index,
            self.with_reauthentication,
            self.with_next_authenticator,
            self.encountered_http_status,
            self.encountered_http_response,
            self.resolution,
        )
    }
}

/// Extra request parts for [`HttpSession::submit`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub form: Option<Vec<(String, String)>>,
}

impl RequestOptions {
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }
}

pub struct HttpSession {
    id: String,
    client: reqwest::Client,
    authenticators: Vec<Authenticator>,
    enable_auth: bool,
    suppress_error: bool,
}

impl HttpSession {
    pub fn new(authenticators: Vec<Authenticator>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client: super::make_client(),
            authenticators,
            enable_auth: true,
            suppress_error: false,
        }
    }

    /// A session that never decorates requests, for endpoints with
    /// authentication cleared.
    pub fn without_auth() -> Self {
        let mut session = Self::new(Vec::new());
        session.enable_auth = false;
        session
    }

    /// Return non-2xx responses to the caller instead of raising.
    pub fn with_suppressed_errors(mut self) -> Self {
        self.suppress_error = true;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn authenticators(&self) -> &[Authenticator] {
        &self.authenticators
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<reqwest::Response, HttpError> {
        self.submit(Method::GET, url, options, None).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<reqwest::Response, HttpError> {
        self.submit(Method::POST, url, options, None).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<reqwest::Response, HttpError> {
        self.submit(Method::DELETE, url, options, None).await
    }

    /// Send a request, recovering from 401 responses via the authenticator
    /// cascade. Terminates after at most two attempts per authenticator.
    pub async fn submit(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
        trace: Option<&TraceSpan>,
    ) -> Result<reqwest::Response, HttpError> {
        let trace = trace.cloned().unwrap_or_default();

        let mut authenticator_index: usize = 0;
        let mut retry_with_reauth = true;
        let mut retry_with_next = false;
        let mut retry_history: Vec<RetryHistoryEntry> = Vec::new();

        loop {
            let authenticator = if self.enable_auth && !self.authenticators.is_empty() {
                match self.authenticators.get(authenticator_index) {
                    Some(authenticator) => Some(authenticator),
                    None => {
                        error!("[{}] Failed to authenticate for {}", trace, url);
                        for (counter, entry) in retry_history.iter().enumerate() {
                            error!("Retry #{}:\n\n{}\n", counter + 1, entry);
                        }
                        return Err(HttpError::AuthenticationFailed {
                            url: url.to_string(),
                            history: retry_history,
                        });
                    }
                }
            } else {
                None
            };

            let span = trace.child();
            debug!(
                "[{}] {} {} {} (AUTH: {})",
                span,
                method,
                url,
                redact_query(&options.query),
                if self.enable_auth { "Enabled" } else { "Disabled" },
            );

            let mut builder = self.client.request(method.clone(), url);
            for (name, value) in &options.headers {
                builder = builder.header(name.as_str(), value);
            }
            for (name, value) in span.http_headers() {
                builder = builder.header(name, value);
            }
            if !options.query.is_empty() {
                builder = builder.query(&options.query);
            }
            if let Some(body) = &options.json {
                builder = builder.json(body);
            }
            if let Some(form) = &options.form {
                builder = builder.form(form);
            }

            if let Some(authenticator) = authenticator {
                debug!("[{}] AUTH: session_id => {}", span, authenticator.fingerprint());
                builder = authenticator.before_request(builder, &span).await?;
            }

            let response = builder.send().await?;
            let status = response.status();
            debug!("[{}] HTTP {} {} {}", span, status.as_u16(), method, url);

            if status.is_success() || self.suppress_error {
                if self.suppress_error && !status.is_success() {
                    debug!("[{}] Error suppressed by the caller of this method.", span);
                }
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 {
                if let Some(authenticator) = authenticator {
                    authenticator.clear_access_token().await?;

                    let resolution = if retry_with_reauth {
                        "retry with re-authentication"
                    } else {
                        "retry with the next authenticator"
                    };
                    retry_history.push(RetryHistoryEntry {
                        url: url.to_string(),
                        authenticator_index,
                        with_reauthentication: retry_with_reauth,
                        with_next_authenticator: retry_with_next,
                        encountered_http_status: status.as_u16(),
                        encountered_http_response: body,
                        resolution: resolution.to_string(),
                    });

                    if retry_with_reauth {
                        debug!("[{}] Retry with re-authentication.", span);
                        retry_with_reauth = false;
                        retry_with_next = true;
                    } else {
                        debug!("[{}] Retry with the next authenticator.", span);
                        retry_with_reauth = true;
                        retry_with_next = false;
                        authenticator_index += 1;
                    }
                    continue;
                }
            }

            // Non-retryable failure: surface it with whatever diagnostic
            // context the active authenticator can add.
            if let Some(authenticator) = authenticator {
                log_invalid_token_diagnostics(authenticator, &body).await;
            }
            return Err(HttpError::from_status(
                status.as_u16(),
                body,
                trace.to_string(),
            ));
        }
    }
}

/// When the server rejects a token outright, log the (unverified) claims of
/// the token we presented so an operator can see which identity was used.
async fn log_invalid_token_diagnostics(authenticator: &Authenticator, body: &str) {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let invalid_token = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|v| v.as_str())
        == Some("invalid_token");
    if !invalid_token {
        return;
    }

    error!("The server responded with an invalid token error.");
    match authenticator.last_known_session().await {
        Some(session) => match session.access_token.as_deref() {
            Some(token) => match decode_claims_unverified(token) {
                Some(claims) => error!("The token claims are {}.", claims),
                None => error!("The token is not parseable as a JWT."),
            },
            None => error!("The token is not available for this request."),
        },
        None => debug!("No session info available for additional diagnostics."),
    }
}

fn redact_query(query: &[(String, String)]) -> String {
    if query.is_empty() {
        return "(no params)".to_string();
    }
    query
        .iter()
        .map(|(key, _)| format!("{key}=<redacted>"))
        .collect::<Vec<_>>()
        .join("&")
}
