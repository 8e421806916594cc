//! Correlation identifiers propagated with every outbound request

use std::fmt;
use uuid::Uuid;

pub mod headers {
    pub const CORRELATION_ID: &str = "X-Correlation-Id";
    pub const SPAN_ID: &str = "X-Span-Id";
}

/// A trace/span identifier pair for one logical request tree.
///
/// The trace id is shared by every call made on behalf of one caller-visible
/// operation; each individual HTTP exchange gets its own span id via
/// [`TraceSpan::child`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSpan {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceSpan {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
        }
    }

    /// Derive a sub-span that keeps the trace id but gets a fresh span id.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::new_v4().to_string(),
        }
    }

    /// Headers to attach to an outbound request.
    pub fn http_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (headers::CORRELATION_ID, self.trace_id.clone()),
            (headers::SPAN_ID, self.span_id.clone()),
        ]
    }
}

impl Default for TraceSpan {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.trace_id, self.span_id)
    }
}
