//! Error taxonomy for the HTTP access layer

use thiserror::Error;

use super::session::RetryHistoryEntry;
use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum HttpError {
    /// Any non-auth 4xx response, and 401 responses with no authenticator active.
    #[error("HTTP {status}: {body} [{trace}]")]
    Client {
        status: u16,
        body: String,
        trace: String,
    },

    /// 5xx responses.
    #[error("HTTP {status}: {body} [{trace}]")]
    Server {
        status: u16,
        body: String,
        trace: String,
    },

    /// Every configured authenticator was tried and the server still answered 401.
    #[error(
        "Exhausted all authentication methods but still unable to get successful authentication for {url}"
    )]
    AuthenticationFailed {
        url: String,
        history: Vec<RetryHistoryEntry>,
    },

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl HttpError {
    pub fn from_status(status: u16, body: String, trace: String) -> Self {
        let body = if body.trim().is_empty() {
            "(empty response)".to_string()
        } else {
            body
        };
        if status < 500 {
            HttpError::Client {
                status,
                body,
                trace,
            }
        } else {
            HttpError::Server {
                status,
                body,
                trace,
            }
        }
    }

    pub fn retry_history(&self) -> &[RetryHistoryEntry] {
        match self {
            HttpError::AuthenticationFailed { history, .. } => history,
            _ => &[],
        }
    }
}
