//! Credential lifecycle management for Atlas service endpoints
//!
//! Each configured endpoint carries one or more OAuth2 authentication
//! configurations. An [`Authenticator`] owns the lifecycle of one of them:
//! initial acquisition through a grant-specific adapter, refresh, revocation,
//! and request decoration. Sessions persist across process restarts through a
//! [`SessionStore`] keyed by the configuration fingerprint.

pub mod adapters;
pub mod authenticator;
pub mod cloud;
pub mod error;
pub mod events;
pub mod factory;
pub mod models;
pub mod session;
pub mod store;
pub mod subject_token;

pub use adapters::{GrantAdapter, TokenResponse};
pub use authenticator::{AuthState, AuthStateReport, Authenticator};
pub use error::AuthError;
pub use events::{AuthEvent, AuthEventSink, NullEventSink, SharedEventSink};
pub use factory::AdapterFactory;
pub use models::{AuthConfig, GrantType, ServiceEndpoint};
pub use session::SessionRecord;
pub use store::{MemorySessionStore, SessionStore};
pub use subject_token::{PlatformTokenCell, SubjectTokenSource};
