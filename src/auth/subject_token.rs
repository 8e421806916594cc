//! One-time subject tokens handed over by the platform
//!
//! A platform launcher can leave a subject token for the client to exchange
//! exactly once. The contract is an explicit take: reading the token clears
//! it, so a second exchange can never silently reuse it.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

#[async_trait]
pub trait SubjectTokenSource: Send + Sync {
    /// Remove and return the pending token, if any.
    async fn take(&self) -> Result<Option<String>>;
}

/// In-process single-owner cell.
pub struct PlatformTokenCell {
    slot: Mutex<Option<String>>,
}

impl PlatformTokenCell {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.slot.lock().expect("platform token cell poisoned") = Some(token.into());
    }
}

impl Default for PlatformTokenCell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubjectTokenSource for PlatformTokenCell {
    async fn take(&self) -> Result<Option<String>> {
        Ok(self.slot.lock().expect("platform token cell poisoned").take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_clears_the_cell() {
        let cell = PlatformTokenCell::with_token("context_token_123");
        assert_eq!(
            cell.take().await.unwrap(),
            Some("context_token_123".to_string())
        );
        assert_eq!(cell.take().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_pending_token() {
        let cell = PlatformTokenCell::new();
        cell.set("first");
        cell.set("second");
        assert_eq!(cell.take().await.unwrap(), Some("second".to_string()));
    }
}
