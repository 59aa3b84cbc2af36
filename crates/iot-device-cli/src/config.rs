//! Layered configuration for the CLI.
//!
//! Sources (applied in order, later sources override earlier ones):
//!  1. `<user config dir>/iot-device/config.toml` (optional)
//!  2. File given by `--config` / `IOT_DEVICE_CONFIG` (must exist)
//!  3. Environment variables prefixed `IOTDEV__` with `__` as the separator,
//!     e.g. `IOTDEV__DEVICE__HUB_NAME=myhub` sets `device.hub_name`
//!  4. Command-line flags
//!
//! Every field carries a serde default, so an entirely unconfigured
//! environment still produces a valid (if credential-less) configuration.

use crate::DeviceArgs;
use iot_device_client::{DeviceClientError, DeviceCredentials, ServiceCredentials};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Prefix for configuration environment variables
pub const ENV_PREFIX: &str = "IOTDEV";

/// Default device token lifetime
pub const DEFAULT_DEVICE_TOKEN_TTL: i64 = 600;

/// Default registry token lifetime
pub const DEFAULT_REGISTRY_TOKEN_TTL: i64 = 3600;

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid credentials: {0}")]
    Credentials(#[from] DeviceClientError),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Device identity and token settings
    pub device: DeviceConfig,

    /// Registry (service) access settings
    pub registry: RegistryConfig,

    /// HTTP settings
    pub http: HttpConfig,
}

/// Device identity and token settings
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub hub_name: Option<String>,
    pub device_name: Option<String>,
    pub shared_key: Option<String>,
    pub host_domain: Option<String>,
    pub connection_string: Option<String>,
    pub token_ttl_seconds: i64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hub_name: None,
            device_name: None,
            shared_key: None,
            host_domain: None,
            connection_string: None,
            token_ttl_seconds: DEFAULT_DEVICE_TOKEN_TTL,
        }
    }
}

impl DeviceConfig {
    /// Overlay values given on the command line
    pub fn apply_args(&mut self, args: &DeviceArgs) {
        if let Some(hub_name) = &args.hub_name {
            self.hub_name = Some(hub_name.clone());
        }
        if let Some(device_name) = &args.device_name {
            self.device_name = Some(device_name.clone());
        }
        if let Some(shared_key) = &args.shared_key {
            self.shared_key = Some(shared_key.clone());
        }
        if let Some(connection_string) = &args.connection_string {
            self.connection_string = Some(connection_string.clone());
        }
        if let Some(ttl) = args.token_ttl_seconds {
            self.token_ttl_seconds = ttl;
        }
    }

    /// Build device credentials.
    ///
    /// A connection string takes precedence over individual fields.
    pub fn credentials(&self) -> Result<DeviceCredentials, ConfigError> {
        let credentials = match &self.connection_string {
            Some(connection_string) => DeviceCredentials::from_connection_string(connection_string)?,
            None => DeviceCredentials::new(
                required(&self.hub_name, "device.hub_name")?,
                required(&self.device_name, "device.device_name")?,
                required(&self.shared_key, "device.shared_key")?,
            )?,
        };

        Ok(match &self.host_domain {
            Some(domain) => credentials.with_host_domain(domain),
            None => credentials,
        })
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("hub_name", &self.hub_name)
            .field("device_name", &self.device_name)
            .field("shared_key", &redacted(&self.shared_key))
            .field("host_domain", &self.host_domain)
            .field("connection_string", &redacted(&self.connection_string))
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

/// Registry (service) access settings
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub connection_string: Option<String>,
    pub token_ttl_seconds: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            token_ttl_seconds: DEFAULT_REGISTRY_TOKEN_TTL,
        }
    }
}

impl RegistryConfig {
    pub fn credentials(&self) -> Result<ServiceCredentials, ConfigError> {
        let connection_string = required(&self.connection_string, "registry.connection_string")?;
        Ok(ServiceCredentials::from_connection_string(connection_string)?)
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("connection_string", &redacted(&self.connection_string))
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

/// HTTP settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout; `None` keeps the HTTP client's default
    pub timeout_seconds: Option<u64>,
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
        })
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<REDACTED>")
}

// ============================================================================
// Loading
// ============================================================================

/// Builds a [`CliConfig`] from files and the environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_file: Option<PathBuf>,
    explicit_file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader with the per-user config file and the `IOTDEV` prefix
    pub fn new() -> Self {
        Self {
            user_file: default_config_path(),
            explicit_file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Skip the per-user config file
    pub fn without_user_file(mut self) -> Self {
        self.user_file = None;
        self
    }

    /// Add a file that must exist
    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_file = path;
        self
    }

    /// Read environment variables with a different prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> Result<CliConfig, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(user_file) = &self.user_file {
            builder = builder.add_source(toml_file(user_file).required(false));
        }

        if let Some(explicit_file) = &self.explicit_file {
            if !explicit_file.exists() {
                return Err(ConfigError::FileNotFound {
                    path: explicit_file.clone(),
                });
            }
            debug!(path = %explicit_file.display(), "Loading configuration file");
            builder = builder.add_source(toml_file(explicit_file).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(&self.env_prefix).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

fn toml_file(path: &Path) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path).format(config::FileFormat::Toml)
}

/// `<user config dir>/iot-device/config.toml`, when the platform has one
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("iot-device").join("config.toml"))
}
