//! Error types for pcd-capture.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (summary output only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The endpoint string could not be resolved to a host and port.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The TCP connection could not be established.
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection was not established within the connect timeout.
    #[error("Timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    /// Protocol error (oversized header line, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Nothing was captured, so there is nothing to serialize.
    #[error("Capture contains no points")]
    EmptyCapture,
}

/// Result type alias using CaptureError.
pub type Result<T> = std::result::Result<T, CaptureError>;
