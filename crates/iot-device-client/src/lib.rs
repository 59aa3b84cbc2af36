//! # IoT Device Client
//!
//! Minimal client for the Azure IoT Hub HTTPS messaging endpoints.
//!
//! This library provides:
//! - Shared Access Signature (SAS) token generation
//! - Device-to-cloud telemetry publishing
//! - Cloud-to-device message retrieval with at-least-once settlement
//!   (complete, reject, abandon)
//! - Device identity management against the hub registry
//!
//! ## Module Organization
//!
//! - [error] - Error types for all client operations
//! - [credentials] - Shared keys, device and service credentials
//! - [signer] - SAS token signing and clocks
//! - [token] - Explicit cache for the most recently issued token
//! - [transport] - HTTP capability consumed by the clients
//! - [message] - Outbound and inbound message types
//! - [client] - Device queue client
//! - [registry] - Service-side device registry client
//!
//! ## Example
//!
//! ```no_run
//! use iot_device_client::{DeviceCredentials, OutboundMessage, QueueClient, ReqwestTransport};
//!
//! # async fn example() -> Result<(), iot_device_client::DeviceClientError> {
//! let credentials = DeviceCredentials::new("my-hub", "sensor-01", "c2VjcmV0")?;
//! let client = QueueClient::new(credentials, ReqwestTransport::new()?);
//!
//! client.refresh_token(600);
//! let status = client.publish(&OutboundMessage::json(r#"{"temperature":21}"#)).await?;
//! assert_eq!(status, 204);
//!
//! let message = client.read().await?;
//! if let Some(id) = &message.message_id {
//!     client.complete(id).await?;
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod client;
pub mod credentials;
pub mod error;
pub mod message;
pub mod registry;
pub mod signer;
pub mod token;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, Settlement, DEVICE_API_VERSION};
pub use credentials::{ConnectionString, DeviceCredentials, ServiceCredentials, SharedKey};
pub use error::{ConfigurationError, DeviceClientError, ValidationError};
pub use message::{InboundMessage, MessageId, OutboundMessage};
pub use registry::{
    validate_device_id, AddDeviceOutcome, DeviceAuthentication, DeviceIdentity, DeviceStatus,
    RegistryClient, RemoveDeviceOutcome, SymmetricKey, REGISTRY_API_VERSION,
};
pub use signer::{Clock, FixedClock, SasSigner, SasToken, SystemClock};
pub use token::TokenCache;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
