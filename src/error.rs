//! Error types for the smartctl exporter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the smartctl exporter
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Device filter pattern did not compile
    #[error("Invalid device pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    // =========================================================================
    // Diagnostic Tool Errors
    // =========================================================================
    /// smartctl (or a companion tool) could not be run or returned garbage
    #[error("Command '{command}' failed: {reason}")]
    Smartctl { command: String, reason: String },

    /// Per-device read exceeded the configured timeout
    #[error("Read of device {device} timed out after {timeout:?}")]
    ReadTimeout {
        device: String,
        timeout: std::time::Duration,
    },

    // =========================================================================
    // Exposition Errors
    // =========================================================================
    /// Prometheus registry or encoder error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
