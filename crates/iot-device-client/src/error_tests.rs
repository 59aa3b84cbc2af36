//! Tests for error types.

use super::*;
use base64::{engine::general_purpose::STANDARD, Engine};

#[test]
fn test_error_transience() {
    assert!(DeviceClientError::Transport {
        message: "connection reset".to_string(),
    }
    .is_transient());

    assert!(!DeviceClientError::TokenNotIssued.is_transient());

    assert!(DeviceClientError::Service {
        status: 503,
        message: "unavailable".to_string(),
    }
    .is_transient());

    assert!(DeviceClientError::Service {
        status: 429,
        message: "throttled".to_string(),
    }
    .is_transient());

    assert!(!DeviceClientError::Service {
        status: 401,
        message: "unauthorized".to_string(),
    }
    .is_transient());
}

#[test]
fn test_decode_error_converts_to_invalid_shared_key() {
    let decode_error = STANDARD.decode("not base64!").unwrap_err();
    let error: DeviceClientError = decode_error.into();

    assert!(matches!(error, DeviceClientError::InvalidSharedKey(_)));
    assert!(!error.is_transient());
    assert!(error.to_string().contains("not valid base64"));
}

#[test]
fn test_nested_errors_display_context() {
    let error: DeviceClientError = ConfigurationError::Missing {
        key: "HostName".to_string(),
    }
    .into();
    assert_eq!(
        error.to_string(),
        "Configuration error: Missing required configuration: HostName"
    );

    let error: DeviceClientError = ValidationError::Required {
        field: "device_id".to_string(),
    }
    .into();
    assert_eq!(
        error.to_string(),
        "Validation error: Required field missing: device_id"
    );
}
