//! Lifecycle notifications for presentation layers
//!
//! Authenticators and adapters report progress through an [`AuthEventSink`]
//! passed in at construction. Nothing in the core depends on how (or whether)
//! a sink renders the events.

use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum AuthEvent {
    AuthBegin {
        endpoint_id: Option<String>,
        resource_url: String,
    },
    AuthEnd {
        endpoint_id: Option<String>,
        ok: bool,
    },
    RefreshBefore {
        endpoint_id: Option<String>,
    },
    RefreshOk {
        endpoint_id: Option<String>,
    },
    RefreshFailure {
        endpoint_id: Option<String>,
        reason: String,
    },
    NoRefreshToken {
        endpoint_id: Option<String>,
    },
    RefreshSkipped {
        endpoint_id: Option<String>,
        reason: String,
    },
    SessionRestored {
        endpoint_id: Option<String>,
    },
    SessionRevoked {
        endpoint_id: Option<String>,
    },
    /// The device-code flow is waiting for the user to complete verification.
    DeviceAuthorization {
        verification_uri: String,
        user_code: String,
        expires_in: u64,
    },
}

pub trait AuthEventSink: Send + Sync {
    fn on_event(&self, event: &AuthEvent);
}

pub type SharedEventSink = Arc<dyn AuthEventSink>;

/// Discards all events. The default when no presentation layer is attached.
pub struct NullEventSink;

impl AuthEventSink for NullEventSink {
    fn on_event(&self, _event: &AuthEvent) {}
}
