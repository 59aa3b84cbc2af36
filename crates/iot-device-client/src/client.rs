//! Device queue client.
//!
//! Performs the device messaging operations against
//! `https://{hub}.{domain}/devices/{device}/messages/`:
//!
//! | Operation  | Request                                              |
//! |------------|------------------------------------------------------|
//! | `publish`  | `POST   events?{api}`                                |
//! | `read`     | `GET    devicebound?{api}`                           |
//! | `complete` | `DELETE devicebound/{id}?{api}`                      |
//! | `reject`   | `DELETE devicebound/{id}?reject&{api}`               |
//! | `abandon`  | `POST   devicebound/{id}/abandon?{api}` (empty body) |
//!
//! ## Message Lifecycle
//!
//! ```text
//! [enqueued by cloud] --read--> [visible, holds message id]
//!   [visible] --complete--> [removed]        (terminal)
//!   [visible] --reject----> [dead-lettered]  (terminal)
//!   [visible] --abandon---> [enqueued again] (re-deliverable)
//! ```
//!
//! ## Status Codes
//!
//! Every operation returns the hub's HTTP status verbatim. A 204 means
//! success; anything else is for the caller to interpret. Only network-level
//! failures and a missing token are reported as errors.
//!
//! ## Tokens
//!
//! Each request carries the token most recently issued through
//! [`QueueClient::refresh_token`]. Tokens are never renewed implicitly; once
//! the current token expires the hub rejects requests (typically with 401)
//! until the caller refreshes it.

use crate::credentials::DeviceCredentials;
use crate::error::DeviceClientError;
use crate::message::{InboundMessage, MessageId, OutboundMessage};
use crate::signer::{Clock, SasSigner, SasToken};
use crate::token::TokenCache;
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Query parameter sent with every device messaging request
pub const DEVICE_API_VERSION: &str = "api-version=2015-08-15-preview";

const AUTHORIZATION_HEADER: &str = "Authorization";
const CONTENT_TYPE_HEADER: &str = "Content-Type";

// ============================================================================
// Settlement
// ============================================================================

/// Action taken on a message obtained from [`QueueClient::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Settlement {
    /// Remove the message from the queue (terminal)
    Complete,
    /// Dead-letter the message (terminal)
    Reject,
    /// Return the message to the queue for redelivery
    Abandon,
}

impl Settlement {
    /// Check if the message leaves the queue for good
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Complete => true,
            Self::Reject => true,
            Self::Abandon => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Reject => "reject",
            Self::Abandon => "abandon",
        }
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Settlement {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "reject" => Ok(Self::Reject),
            "abandon" => Ok(Self::Abandon),
            _ => Err(crate::error::ValidationError::InvalidFormat {
                field: "settlement".to_string(),
                message: format!("'{}' is not one of complete, reject, abandon", s),
            }),
        }
    }
}

// ============================================================================
// Queue Client
// ============================================================================

/// Client for one device's messaging endpoints.
///
/// Operations are sequential request/response exchanges: each awaits exactly
/// one HTTP call and returns its outcome. Nothing is retried.
pub struct QueueClient<T: HttpTransport> {
    transport: T,
    tokens: TokenCache,
    base_url: String,
    device_name: String,
}

impl<T: HttpTransport> QueueClient<T> {
    /// Create a client for the device described by `credentials`.
    ///
    /// No token is issued yet; call [`refresh_token`](Self::refresh_token)
    /// before the first request.
    pub fn new(credentials: DeviceCredentials, transport: T) -> Self {
        let signer = SasSigner::new(credentials.shared_key().clone());
        let base_url = format!(
            "https://{}/devices/{}/messages/",
            credentials.host_name(),
            credentials.device_name()
        );

        Self {
            transport,
            tokens: TokenCache::new(signer, credentials.resource_uri()),
            base_url,
            device_name: credentials.device_name().to_string(),
        }
    }

    /// Replace the clock used to compute token expiry.
    ///
    /// Any previously issued token is discarded.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let signer = self.tokens.signer().clone().with_clock(clock);
        self.tokens = TokenCache::new(signer, self.tokens.resource_uri().to_string());
        self
    }

    /// Send requests to `base_url` (e.g. a local test server) instead of the
    /// hub host. The signed resource is unchanged.
    ///
    /// `base_url` is the messages root and should end with `/`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Messages root all operation URLs are built from
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a token valid for `ttl_seconds` and use it for all later calls.
    pub fn refresh_token(&self, ttl_seconds: i64) -> SasToken {
        self.tokens.issue(ttl_seconds)
    }

    /// The token requests are currently signed with
    pub fn current_token(&self) -> Option<SasToken> {
        self.tokens.current()
    }

    /// Publish a device-to-cloud message.
    ///
    /// Returns the raw status code; 204 means the hub accepted the message.
    pub async fn publish(&self, message: &OutboundMessage) -> Result<u16, DeviceClientError> {
        let url = format!("{}events?{}", self.base_url, DEVICE_API_VERSION);
        let request = self
            .authorized(HttpMethod::Post, url)?
            .with_header(CONTENT_TYPE_HEADER, message.content_type.clone())
            .with_body(message.body.clone());

        let status = self.transport.send(request).await?.status;
        info!(
            device = %self.device_name,
            bytes = message.body.len(),
            status = status,
            "Published device-to-cloud message"
        );

        Ok(status)
    }

    /// Read the next cloud-to-device message.
    ///
    /// An empty queue is reported as an [`InboundMessage`] whose
    /// `message_id` is `None`.
    pub async fn read(&self) -> Result<InboundMessage, DeviceClientError> {
        let url = format!("{}devicebound?{}", self.base_url, DEVICE_API_VERSION);
        let request = self.authorized(HttpMethod::Get, url)?;

        let response = self.transport.send(request).await?;
        let message = InboundMessage::from_response(response);

        match &message.message_id {
            Some(id) => info!(
                device = %self.device_name,
                message_id = %id,
                status = message.status_code,
                "Received cloud-to-device message"
            ),
            None => debug!(
                device = %self.device_name,
                status = message.status_code,
                "No cloud-to-device message queued"
            ),
        }

        Ok(message)
    }

    /// Complete a message, removing it from the queue.
    pub async fn complete(&self, message_id: &MessageId) -> Result<u16, DeviceClientError> {
        let url = format!(
            "{}devicebound/{}?{}",
            self.base_url, message_id, DEVICE_API_VERSION
        );
        self.send_settlement(Settlement::Complete, message_id, HttpMethod::Delete, url)
            .await
    }

    /// Reject a message, moving it to the dead-letter state.
    pub async fn reject(&self, message_id: &MessageId) -> Result<u16, DeviceClientError> {
        let url = format!(
            "{}devicebound/{}?reject&{}",
            self.base_url, message_id, DEVICE_API_VERSION
        );
        self.send_settlement(Settlement::Reject, message_id, HttpMethod::Delete, url)
            .await
    }

    /// Abandon a message, returning it to the queue for redelivery.
    pub async fn abandon(&self, message_id: &MessageId) -> Result<u16, DeviceClientError> {
        let url = format!(
            "{}devicebound/{}/abandon?{}",
            self.base_url, message_id, DEVICE_API_VERSION
        );
        self.send_settlement(Settlement::Abandon, message_id, HttpMethod::Post, url)
            .await
    }

    /// Apply `settlement` to a message.
    pub async fn settle(
        &self,
        message_id: &MessageId,
        settlement: Settlement,
    ) -> Result<u16, DeviceClientError> {
        match settlement {
            Settlement::Complete => self.complete(message_id).await,
            Settlement::Reject => self.reject(message_id).await,
            Settlement::Abandon => self.abandon(message_id).await,
        }
    }

    async fn send_settlement(
        &self,
        settlement: Settlement,
        message_id: &MessageId,
        method: HttpMethod,
        url: String,
    ) -> Result<u16, DeviceClientError> {
        let request = self.authorized(method, url)?;

        let status = self.transport.send(request).await?.status;
        info!(
            device = %self.device_name,
            message_id = %message_id,
            settlement = %settlement,
            status = status,
            "Settled cloud-to-device message"
        );

        Ok(status)
    }

    /// Build a request carrying the current token
    fn authorized(&self, method: HttpMethod, url: String) -> Result<HttpRequest, DeviceClientError> {
        let token = self.tokens.require_current()?;
        Ok(HttpRequest::new(method, url).with_header(AUTHORIZATION_HEADER, token.header_value()))
    }
}

impl<T: HttpTransport> fmt::Debug for QueueClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient")
            .field("base_url", &self.base_url)
            .field("device_name", &self.device_name)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
