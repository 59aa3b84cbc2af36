//! Error types for device client operations.

use thiserror::Error;

/// Comprehensive error type for all client operations
///
/// Non-success HTTP statuses returned by the device messaging endpoints are
/// *not* errors; they are handed back to the caller as plain status codes.
#[derive(Debug, Error)]
pub enum DeviceClientError {
    #[error("Shared access key is not valid base64: {0}")]
    InvalidSharedKey(#[from] base64::DecodeError),

    #[error("No access token has been issued; refresh the token before calling the hub")]
    TokenNotIssued,

    #[error("Transport failed: {message}")]
    Transport { message: String },

    #[error("Hub returned status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl DeviceClientError {
    /// Check if error is transient and the call could succeed if repeated
    ///
    /// The client itself never retries; this is a hint for callers that
    /// implement their own policy.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidSharedKey(_) => false,
            Self::TokenNotIssued => false,
            Self::Transport { .. } => true,
            Self::Service { status, .. } => *status >= 500 || *status == 429,
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
        }
    }
}

impl From<reqwest::Error> for DeviceClientError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport {
            message: error.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
