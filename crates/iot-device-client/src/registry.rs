//! Device identity registry client.
//!
//! Manages device identities through the hub's service-side REST API using a
//! shared access policy (for example `iothubowner`). Supported operations:
//!
//! - **Add**: create a device identity with generated symmetric keys. If the
//!   device already exists, the existing identity is returned instead.
//! - **Get**: fetch one identity; a missing device is `None`.
//! - **Remove**: delete an identity unconditionally (`If-Match: *`).
//! - **List**: fetch up to `max_count` identities.
//!
//! Unlike the device messaging operations, unexpected statuses from the
//! registry are reported as [`DeviceClientError::Service`] since every call
//! has a typed result to decode.

use crate::credentials::ServiceCredentials;
use crate::error::{DeviceClientError, ValidationError};
use crate::signer::{Clock, SasSigner, SasToken};
use crate::token::TokenCache;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

/// Query parameter sent with every registry request
pub const REGISTRY_API_VERSION: &str = "api-version=2020-05-31-preview";

/// Maximum device id length accepted by the hub
pub const MAX_DEVICE_ID_LENGTH: usize = 128;

// ============================================================================
// Device Identity Types
// ============================================================================

/// Whether a device may connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Enabled,
    Disabled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Symmetric keys generated for a device
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymmetricKey {
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub secondary_key: Option<String>,
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("primary_key", &self.primary_key.as_ref().map(|_| "<REDACTED>"))
            .field(
                "secondary_key",
                &self.secondary_key.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Authentication section of a device identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthentication {
    #[serde(default, rename = "type")]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub symmetric_key: Option<SymmetricKey>,
}

/// Device identity as stored in the hub registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: String,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub connection_state: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub authentication: Option<DeviceAuthentication>,
}

impl DeviceIdentity {
    /// Primary symmetric key, when the hub generated one
    pub fn primary_key(&self) -> Option<&str> {
        self.authentication
            .as_ref()?
            .symmetric_key
            .as_ref()?
            .primary_key
            .as_deref()
    }
}

/// Outcome of [`RegistryClient::add_device`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddDeviceOutcome {
    /// A new identity was created
    Created(DeviceIdentity),
    /// The device was already registered; this is its current identity
    AlreadyExists(DeviceIdentity),
}

impl AddDeviceOutcome {
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            Self::Created(identity) => identity,
            Self::AlreadyExists(identity) => identity,
        }
    }
}

/// Outcome of [`RegistryClient::remove_device`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveDeviceOutcome {
    Removed,
    NotFound,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeviceRequest<'a> {
    device_id: &'a str,
}

// ============================================================================
// Registry Client
// ============================================================================

/// Client for the hub's device identity registry.
pub struct RegistryClient<T: HttpTransport> {
    transport: T,
    tokens: TokenCache,
    base_url: String,
}

impl<T: HttpTransport> RegistryClient<T> {
    /// Create a registry client; no token is issued until
    /// [`refresh_token`](Self::refresh_token) is called.
    pub fn new(credentials: ServiceCredentials, transport: T) -> Self {
        let signer = SasSigner::new(credentials.shared_key().clone())
            .with_key_name(credentials.policy_name());
        let base_url = format!("https://{}/", credentials.host_name());

        Self {
            transport,
            tokens: TokenCache::new(signer, credentials.host_name()),
            base_url,
        }
    }

    /// Replace the clock used to compute token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let signer = self.tokens.signer().clone().with_clock(clock);
        self.tokens = TokenCache::new(signer, self.tokens.resource_uri().to_string());
        self
    }

    /// Send requests to `base_url` instead of the hub host. Must end with `/`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Issue a policy token valid for `ttl_seconds`.
    pub fn refresh_token(&self, ttl_seconds: i64) -> SasToken {
        self.tokens.issue(ttl_seconds)
    }

    pub fn current_token(&self) -> Option<SasToken> {
        self.tokens.current()
    }

    /// Register a device, or return its identity if it already exists.
    pub async fn add_device(&self, device_id: &str) -> Result<AddDeviceOutcome, DeviceClientError> {
        validate_device_id(device_id)?;

        let body = serde_json::to_vec(&CreateDeviceRequest { device_id })?;
        let request = self
            .authorized(HttpMethod::Put, self.device_url(device_id))?
            .with_header("Content-Type", "application/json")
            .with_body(body);

        let response = self.transport.send(request).await?;
        match response.status {
            409 => {
                warn!(device_id = %device_id, "Device already registered");
                match self.get_device(device_id).await? {
                    Some(identity) => Ok(AddDeviceOutcome::AlreadyExists(identity)),
                    None => Err(DeviceClientError::Service {
                        status: 404,
                        message: format!(
                            "device '{}' reported as existing but could not be fetched",
                            device_id
                        ),
                    }),
                }
            }
            _ => {
                let identity: DeviceIdentity = decode_success(response)?;
                info!(device_id = %identity.device_id, "Registered device");
                Ok(AddDeviceOutcome::Created(identity))
            }
        }
    }

    /// Fetch a device identity; `None` when the device is not registered.
    pub async fn get_device(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceIdentity>, DeviceClientError> {
        validate_device_id(device_id)?;

        let request = self.authorized(HttpMethod::Get, self.device_url(device_id))?;
        let response = self.transport.send(request).await?;

        if response.status == 404 {
            return Ok(None);
        }
        decode_success(response).map(Some)
    }

    /// Remove a device identity regardless of its current ETag.
    pub async fn remove_device(
        &self,
        device_id: &str,
    ) -> Result<RemoveDeviceOutcome, DeviceClientError> {
        validate_device_id(device_id)?;

        let request = self
            .authorized(HttpMethod::Delete, self.device_url(device_id))?
            .with_header("If-Match", "*");
        let response = self.transport.send(request).await?;

        match response.status {
            404 => {
                warn!(device_id = %device_id, "Device not registered");
                Ok(RemoveDeviceOutcome::NotFound)
            }
            status if (200..300).contains(&status) => {
                info!(device_id = %device_id, "Removed device");
                Ok(RemoveDeviceOutcome::Removed)
            }
            _ => Err(service_error(&response)),
        }
    }

    /// List up to `max_count` device identities.
    pub async fn list_devices(
        &self,
        max_count: u32,
    ) -> Result<Vec<DeviceIdentity>, DeviceClientError> {
        let url = format!(
            "{}devices?top={}&{}",
            self.base_url, max_count, REGISTRY_API_VERSION
        );
        let request = self.authorized(HttpMethod::Get, url)?;
        let response = self.transport.send(request).await?;

        let devices: Vec<DeviceIdentity> = decode_success(response)?;
        info!(count = devices.len(), "Listed devices");
        Ok(devices)
    }

    fn device_url(&self, device_id: &str) -> String {
        format!(
            "{}devices/{}?{}",
            self.base_url,
            urlencoding::encode(device_id),
            REGISTRY_API_VERSION
        )
    }

    fn authorized(&self, method: HttpMethod, url: String) -> Result<HttpRequest, DeviceClientError> {
        let token = self.tokens.require_current()?;
        Ok(HttpRequest::new(method, url).with_header("Authorization", token.header_value()))
    }
}

impl<T: HttpTransport> fmt::Debug for RegistryClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Check a device id before it is placed in a URL.
pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    if device_id.is_empty() {
        return Err(ValidationError::Required {
            field: "device_id".to_string(),
        });
    }
    if device_id.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "device_id".to_string(),
            message: "must not contain whitespace".to_string(),
        });
    }
    if device_id.chars().count() > MAX_DEVICE_ID_LENGTH {
        return Err(ValidationError::OutOfRange {
            field: "device_id".to_string(),
            message: format!("must be at most {} characters", MAX_DEVICE_ID_LENGTH),
        });
    }
    Ok(())
}

fn decode_success<D: serde::de::DeserializeOwned>(
    response: HttpResponse,
) -> Result<D, DeviceClientError> {
    if !response.is_success() {
        return Err(service_error(&response));
    }
    Ok(serde_json::from_slice(&response.body)?)
}

fn service_error(response: &HttpResponse) -> DeviceClientError {
    DeviceClientError::Service {
        status: response.status,
        message: String::from_utf8_lossy(&response.body).into_owned(),
    }
}
