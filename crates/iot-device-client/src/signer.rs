//! Shared Access Signature (SAS) token generation.
//!
//! A SAS token proves possession of a shared key for a bounded time window.
//! The signing process is:
//!
//! 1. `expiry = now + ttl` (unix seconds, no bounds enforced)
//! 2. URL-encode the resource URI
//! 3. HMAC-SHA256 over `"{encoded_uri}\n{expiry}"`, keyed with the decoded key
//! 4. base64-encode the digest, then URL-encode the base64 text
//!
//! The result is rendered as
//! `SharedAccessSignature sr={encoded_uri}&sig={signature}&se={expiry}`,
//! with `&skn={key_name}` appended for policy-scoped (service) tokens.
//!
//! ## References
//!
//! - [Control access to IoT Hub](https://learn.microsoft.com/azure/iot-hub/authenticate-authorize-sas)

use crate::credentials::SharedKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
#[path = "signer_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Clocks
// ============================================================================

/// Source of the current unix time used to compute token expiry.
pub trait Clock: Send + Sync {
    /// Seconds since the unix epoch
    fn now_unix(&self) -> i64;
}

/// Wall clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock frozen at a fixed instant, for deterministic signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// SAS Token
// ============================================================================

/// Signed, time-bounded authorization token.
///
/// The token is stateless: it is valid for any request against its resource
/// until `expiry`. Expiry is informational only; nothing in this crate
/// refuses to send an expired token. The signature is never exposed in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SasToken {
    resource_uri: String,
    signature: String,
    expiry: i64,
    key_name: Option<String>,
}

impl SasToken {
    /// URL-encoded resource the token is scoped to (the `sr` field)
    pub fn resource_uri(&self) -> &str {
        &self.resource_uri
    }

    /// URL-encoded base64 signature (the `sig` field)
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Expiry as unix seconds (the `se` field)
    pub fn expiry(&self) -> i64 {
        self.expiry
    }

    /// Shared access policy name (the `skn` field), if any
    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    /// Expiry as a timestamp, when representable
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expiry, 0)
    }

    /// Check whether the token has expired at `now_unix`
    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        now_unix >= self.expiry
    }

    /// Value for the `Authorization` header
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SharedAccessSignature sr={}&sig={}&se={}",
            self.resource_uri, self.signature, self.expiry
        )?;
        if let Some(key_name) = &self.key_name {
            write!(f, "&skn={}", key_name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasToken")
            .field("resource_uri", &self.resource_uri)
            .field("signature", &"<REDACTED>")
            .field("expiry", &self.expiry)
            .field("key_name", &self.key_name)
            .finish()
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Issues SAS tokens from a shared key.
#[derive(Clone)]
pub struct SasSigner {
    key: SharedKey,
    key_name: Option<String>,
    clock: Arc<dyn Clock>,
}

impl SasSigner {
    /// Create a signer using the system clock.
    pub fn new(key: SharedKey) -> Self {
        Self {
            key,
            key_name: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Name the shared access policy the key belongs to (service tokens).
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    /// Replace the clock used to compute expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issue a token for `resource_uri` that expires `ttl_seconds` from now.
    ///
    /// `resource_uri` is the un-encoded resource, e.g.
    /// `myhub.azure-devices.net/devices/sensor-01`. A zero or negative TTL is
    /// passed through and yields an already-expired token.
    ///
    /// # Example
    ///
    /// ```
    /// use iot_device_client::{FixedClock, SasSigner, SharedKey};
    /// use std::sync::Arc;
    ///
    /// let signer = SasSigner::new(SharedKey::from_base64("c2VjcmV0").unwrap())
    ///     .with_clock(Arc::new(FixedClock(1000)));
    /// let token = signer.issue("h.azure-devices.net/devices/d", 600);
    ///
    /// assert_eq!(token.expiry(), 1600);
    /// assert_eq!(token.resource_uri(), "h.azure-devices.net%2Fdevices%2Fd");
    /// ```
    pub fn issue(&self, resource_uri: &str, ttl_seconds: i64) -> SasToken {
        let expiry = self.clock.now_unix().saturating_add(ttl_seconds);
        self.issue_with_expiry(resource_uri, expiry)
    }

    /// Issue a token with an absolute expiry (unix seconds).
    pub fn issue_with_expiry(&self, resource_uri: &str, expiry: i64) -> SasToken {
        let encoded_uri = urlencoding::encode(resource_uri).into_owned();
        let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

        let digest = self.hmac_sha256(string_to_sign.as_bytes());
        let signature = urlencoding::encode(&STANDARD.encode(digest)).into_owned();

        SasToken {
            resource_uri: encoded_uri,
            signature,
            expiry,
            key_name: self.key_name.clone(),
        }
    }

    /// Compute HMAC-SHA256 with the shared key
    fn hmac_sha256(&self, data: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(self.key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for SasSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasSigner")
            .field("key", &self.key)
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}
