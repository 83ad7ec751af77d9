//! Error types for cuecast
//!
//! Provides a unified error type used across all cuecast crates.

use std::path::PathBuf;

/// Main error type for cuecast operations
#[derive(Debug, thiserror::Error)]
pub enum CuecastError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Server Lifecycle Errors ===

    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server already running on {addr}")]
    AlreadyRunning { addr: String },

    #[error("Server is not running")]
    NotRunning,

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CuecastError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is expected connection churn rather than a fault
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

/// Result type alias using CuecastError
pub type Result<T> = std::result::Result<T, CuecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CuecastError::NotRunning;
        assert_eq!(err.to_string(), "Server is not running");
    }

    #[test]
    fn test_is_transport() {
        assert!(CuecastError::ConnectionClosed.is_transport());
        assert!(CuecastError::connection("reset by peer").is_transport());
        assert!(!CuecastError::config("bad port").is_transport());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: CuecastError = io_err.into();
        assert!(matches!(err, CuecastError::Io(_)));
    }
}
