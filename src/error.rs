//! # Error Types
//!
//! Error taxonomy for the telemetry transport and supervisor, built with `thiserror`.

use thiserror::Error;

/// Main error type for CSI telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid or missing configuration field
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse failure
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// TOML serialization failure while saving
    #[error("Configuration serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Payload exceeds the 16-bit length field or the configured buffer
    #[error("Payload too large: {len} bytes (limit {limit})")]
    PayloadTooLarge { len: usize, limit: usize },

    /// Malformed wire frame or payload body
    #[error("Framing error: {0}")]
    Framing(String),

    /// Streaming channel is not connected and buffering is disabled
    #[error("Stream channel not connected")]
    NotConnected,

    /// Caller passed an argument outside the accepted range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Every HTTP attempt failed
    #[error("Transmission to {endpoint} failed after {attempts} attempt(s)")]
    TransmissionFailed { endpoint: String, attempts: u32 },

    /// A single network or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Stream send buffer full, frame dropped
    #[error("Send buffer full, message dropped")]
    BufferFull,

    /// Free heap below the safety threshold
    #[error("Critical resource error: {0}")]
    CriticalResource(String),

    /// Remote command without a registered handler
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON payload errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelemetryError {
    /// True for errors that are retried by the request/response channel
    pub fn is_transient(&self) -> bool {
        matches!(self, TelemetryError::Transport(_))
    }
}

/// Result type alias for CSI telemetry
pub type Result<T> = std::result::Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_too_large_message() {
        let err = TelemetryError::PayloadTooLarge { len: 70000, limit: 65535 };
        assert_eq!(err.to_string(), "Payload too large: 70000 bytes (limit 65535)");
    }

    #[test]
    fn test_transmission_failed_message() {
        let err = TelemetryError::TransmissionFailed {
            endpoint: "/api/device/alert".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("/api/device/alert"));
        assert!(err.to_string().contains("3 attempt"));
    }

    #[test]
    fn test_is_transient() {
        assert!(TelemetryError::Transport("timeout".into()).is_transient());
        assert!(!TelemetryError::NotConnected.is_transient());
        assert!(!TelemetryError::Framing("bad tag".into()).is_transient());
    }
}
