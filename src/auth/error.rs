//! Typed failures of the credential lifecycle

use thiserror::Error;

use super::models::GrantType;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable session and no way to silently refresh. The caller can
    /// recover by re-running an interactive or credentialed flow.
    #[error("Re-authentication required: {reason}")]
    ReauthenticationRequired { reason: String },

    /// A grant adapter could not complete its acquisition protocol.
    #[error("{message}")]
    Grant {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("No registered grant adapter supports '{0}'")]
    UnsupportedGrant(GrantType),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("Transport failure during authentication: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AuthError {
    pub fn reauthentication_required(reason: impl Into<String>) -> Self {
        AuthError::ReauthenticationRequired {
            reason: reason.into(),
        }
    }

    pub fn grant(message: impl Into<String>) -> Self {
        AuthError::Grant {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn grant_rejected(message: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        AuthError::Grant {
            message: message.into(),
            status: Some(status),
            body: Some(body.into()),
        }
    }
}
