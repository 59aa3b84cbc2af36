//! Credentials for device and service access to an IoT hub.
//!
//! Keys arrive base64-encoded (as shown in the portal or embedded in a
//! connection string) and are decoded exactly once, when the credentials are
//! constructed. A malformed key therefore fails here and never at signing
//! time.

use crate::error::{ConfigurationError, DeviceClientError};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;

/// Host domain used when credentials only name the hub
pub const DEFAULT_HOST_DOMAIN: &str = "azure-devices.net";

// ============================================================================
// Shared Key
// ============================================================================

/// Decoded shared access key.
///
/// The key bytes are zeroized on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct SharedKey(Zeroizing<Vec<u8>>);

impl SharedKey {
    /// Decode a standard (padded) base64 key.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceClientError::InvalidSharedKey`] when the input is not
    /// valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, DeviceClientError> {
        let bytes = STANDARD.decode(encoded)?;
        Ok(Self(Zeroizing::new(bytes)))
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Raw key bytes, used as the HMAC key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Re-encode the key as standard base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.as_bytes())
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<REDACTED>)")
    }
}

// ============================================================================
// Connection Strings
// ============================================================================

/// Parsed `Key=Value;Key=Value` connection string.
///
/// Values may themselves contain `=` (base64 padding), so each segment is
/// split on its first `=` only.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    entries: HashMap<String, String>,
}

impl ConnectionString {
    pub const HOST_NAME: &'static str = "HostName";
    pub const DEVICE_ID: &'static str = "DeviceId";
    pub const SHARED_ACCESS_KEY: &'static str = "SharedAccessKey";
    pub const SHARED_ACCESS_KEY_NAME: &'static str = "SharedAccessKeyName";

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a value that must be present and non-empty
    pub fn require(&self, key: &str) -> Result<&str, ConfigurationError> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigurationError::Missing {
                key: key.to_string(),
            }),
        }
    }
}

impl FromStr for ConnectionString {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = HashMap::new();

        for segment in s.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                ConfigurationError::Invalid {
                    message: format!(
                        "connection string segment '{}' has no '='",
                        segment_preview(segment)
                    ),
                }
            })?;

            entries.insert(key.trim().to_string(), value.trim().to_string());
        }

        if entries.is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "connection string is empty".to_string(),
            });
        }

        Ok(Self { entries })
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("ConnectionString")
            .field("keys", &keys)
            .finish()
    }
}

// A segment without '=' may be a pasted key, so only its start is echoed.
fn segment_preview(segment: &str) -> String {
    segment.chars().take(8).collect()
}

/// Split `hub.domain` into its lowercase parts.
fn split_host_name(host_name: &str) -> Result<(String, String), ConfigurationError> {
    let host_name = host_name.to_lowercase();
    match host_name.split_once('.') {
        Some((hub, domain)) if !hub.is_empty() && !domain.is_empty() => {
            Ok((hub.to_string(), domain.to_string()))
        }
        _ => Err(ConfigurationError::Invalid {
            message: format!("host name '{}' must have the form <hub>.<domain>", host_name),
        }),
    }
}

// ============================================================================
// Device Credentials
// ============================================================================

/// Identity and key of a single device.
///
/// Hub and device names are lowercased on construction so that the signed
/// resource URI and the request URLs always agree.
#[derive(Debug, Clone)]
pub struct DeviceCredentials {
    hub_name: String,
    device_name: String,
    host_domain: String,
    shared_key: SharedKey,
}

impl DeviceCredentials {
    /// Create device credentials from a hub name, device name and base64 key.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceClientError::InvalidSharedKey`] when `shared_key` is not
    /// valid base64.
    ///
    /// # Example
    ///
    /// ```
    /// use iot_device_client::DeviceCredentials;
    ///
    /// let credentials = DeviceCredentials::new("My-Hub", "Sensor-01", "c2VjcmV0").unwrap();
    /// assert_eq!(credentials.resource_uri(), "my-hub.azure-devices.net/devices/sensor-01");
    /// ```
    pub fn new(
        hub_name: impl AsRef<str>,
        device_name: impl AsRef<str>,
        shared_key: &str,
    ) -> Result<Self, DeviceClientError> {
        Ok(Self {
            hub_name: hub_name.as_ref().to_lowercase(),
            device_name: device_name.as_ref().to_lowercase(),
            host_domain: DEFAULT_HOST_DOMAIN.to_string(),
            shared_key: SharedKey::from_base64(shared_key)?,
        })
    }

    /// Parse a device connection string
    /// (`HostName=<hub>.<domain>;DeviceId=<device>;SharedAccessKey=<base64>`).
    pub fn from_connection_string(connection_string: &str) -> Result<Self, DeviceClientError> {
        let parsed: ConnectionString = connection_string.parse()?;
        let (hub_name, host_domain) =
            split_host_name(parsed.require(ConnectionString::HOST_NAME)?)?;
        let device_name = parsed.require(ConnectionString::DEVICE_ID)?;
        let shared_key = parsed.require(ConnectionString::SHARED_ACCESS_KEY)?;

        Ok(Self::new(hub_name, device_name, shared_key)?.with_host_domain(host_domain))
    }

    /// Override the host domain (defaults to [`DEFAULT_HOST_DOMAIN`])
    pub fn with_host_domain(mut self, host_domain: impl AsRef<str>) -> Self {
        self.host_domain = host_domain.as_ref().to_lowercase();
        self
    }

    pub fn hub_name(&self) -> &str {
        &self.hub_name
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn host_domain(&self) -> &str {
        &self.host_domain
    }

    pub fn shared_key(&self) -> &SharedKey {
        &self.shared_key
    }

    /// `<hub>.<domain>`
    pub fn host_name(&self) -> String {
        format!("{}.{}", self.hub_name, self.host_domain)
    }

    /// Un-encoded resource the device token is scoped to:
    /// `<hub>.<domain>/devices/<device>`
    pub fn resource_uri(&self) -> String {
        format!("{}/devices/{}", self.host_name(), self.device_name)
    }
}

// ============================================================================
// Service Credentials
// ============================================================================

/// Shared access policy credentials for the hub registry.
#[derive(Debug, Clone)]
pub struct ServiceCredentials {
    host_name: String,
    policy_name: String,
    shared_key: SharedKey,
}

impl ServiceCredentials {
    /// Create service credentials from a host name (`<hub>.<domain>`),
    /// policy name and base64 key.
    pub fn new(
        host_name: impl AsRef<str>,
        policy_name: impl Into<String>,
        shared_key: &str,
    ) -> Result<Self, DeviceClientError> {
        let (hub, domain) = split_host_name(host_name.as_ref())?;
        Ok(Self {
            host_name: format!("{}.{}", hub, domain),
            policy_name: policy_name.into(),
            shared_key: SharedKey::from_base64(shared_key)?,
        })
    }

    /// Parse a service connection string
    /// (`HostName=<hub>.<domain>;SharedAccessKeyName=<policy>;SharedAccessKey=<base64>`).
    pub fn from_connection_string(connection_string: &str) -> Result<Self, DeviceClientError> {
        let parsed: ConnectionString = connection_string.parse()?;
        Self::new(
            parsed.require(ConnectionString::HOST_NAME)?,
            parsed.require(ConnectionString::SHARED_ACCESS_KEY_NAME)?,
            parsed.require(ConnectionString::SHARED_ACCESS_KEY)?,
        )
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    pub fn shared_key(&self) -> &SharedKey {
        &self.shared_key
    }
}
