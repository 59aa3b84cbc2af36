//! Message structures for device-to-cloud and cloud-to-device traffic.

use crate::transport::HttpResponse;
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// Content type sent when none is specified
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// Message ID
// ============================================================================

/// Identifier of a cloud-to-device message, taken from the `ETag` of a read.
///
/// The id is opaque; it is not validated locally. A stale or fabricated id is
/// rejected by the hub when used to settle a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from an `ETag` header value, stripping wrapping quotes.
    pub fn from_etag(etag: &str) -> Self {
        Self(etag.trim_matches('"').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Outbound Message
// ============================================================================

/// Device-to-cloud payload.
///
/// The body is opaque bytes; the content type is passed through as the
/// `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Bytes,
    pub content_type: String,
}

impl OutboundMessage {
    /// Create a message with the default (JSON) content type
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Create a JSON message from already-encoded text
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::new(body)
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

impl From<Bytes> for OutboundMessage {
    fn from(body: Bytes) -> Self {
        Self::new(body)
    }
}

impl From<Vec<u8>> for OutboundMessage {
    fn from(body: Vec<u8>) -> Self {
        Self::new(body)
    }
}

impl From<&'static [u8]> for OutboundMessage {
    fn from(body: &'static [u8]) -> Self {
        Self::new(body)
    }
}

// ============================================================================
// Inbound Message
// ============================================================================

/// Result of reading the cloud-to-device queue.
///
/// Status, headers and body are surfaced verbatim. `message_id` is `None`
/// when the response carried no `ETag`, which is how the hub signals an
/// empty queue. That is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub message_id: Option<MessageId>,
}

impl InboundMessage {
    /// Interpret a raw response from the device-bound endpoint.
    pub fn from_response(response: HttpResponse) -> Self {
        let message_id = response.header("ETag").map(MessageId::from_etag);

        Self {
            status_code: response.status,
            headers: response.headers,
            body: response.body,
            message_id,
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Check whether a message was delivered
    pub fn has_message(&self) -> bool {
        self.message_id.is_some()
    }

    /// Look up a response header, ignoring case of the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
