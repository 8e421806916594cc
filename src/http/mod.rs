//! HTTP access layer: request submission, authentication cascade, tracing

pub mod error;
pub mod session;
pub mod trace;

pub use error::HttpError;
pub use session::{HttpSession, RequestOptions, RetryHistoryEntry};
pub use trace::TraceSpan;

use std::time::Duration;

/// Build the shared HTTP client used for API and token-endpoint calls.
pub fn make_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("atlas-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to build HTTP client")
}
