//! Explicit cache for the most recently issued SAS token.
//!
//! The cache pairs a [`SasSigner`] with the resource it signs for and exposes
//! an `issue` / `current` pair. Tokens are never renewed implicitly: callers
//! decide when to issue, and every request uses whatever was issued last.

use crate::error::DeviceClientError;
use crate::signer::{SasSigner, SasToken};
use std::sync::RwLock;
use tracing::debug;

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;

/// Read-mostly holder of the current token for one resource.
///
/// Concurrent readers see either the previous or the newly issued token,
/// never a partially written one.
#[derive(Debug)]
pub struct TokenCache {
    signer: SasSigner,
    resource_uri: String,
    current: RwLock<Option<SasToken>>,
}

impl TokenCache {
    /// Create an empty cache for `resource_uri` (un-encoded).
    pub fn new(signer: SasSigner, resource_uri: impl Into<String>) -> Self {
        Self {
            signer,
            resource_uri: resource_uri.into(),
            current: RwLock::new(None),
        }
    }

    pub fn signer(&self) -> &SasSigner {
        &self.signer
    }

    /// Un-encoded resource tokens are issued for
    pub fn resource_uri(&self) -> &str {
        &self.resource_uri
    }

    /// Issue a fresh token valid for `ttl_seconds` and make it current.
    pub fn issue(&self, ttl_seconds: i64) -> SasToken {
        let token = self.signer.issue(&self.resource_uri, ttl_seconds);
        debug!(
            resource = %self.resource_uri,
            expiry = token.expiry(),
            "Issued shared access token"
        );

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(token.clone());

        token
    }

    /// The last issued token, if any.
    pub fn current(&self) -> Option<SasToken> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The last issued token, or [`DeviceClientError::TokenNotIssued`].
    pub fn require_current(&self) -> Result<SasToken, DeviceClientError> {
        self.current().ok_or(DeviceClientError::TokenNotIssued)
    }
}
