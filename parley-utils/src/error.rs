//! Error types for parley
//!
//! Provides a unified error type used across all parley crates.

/// Main error type for parley operations
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
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
}

/// Result type alias using ParleyError
pub type Result<T> = std::result::Result<T, ParleyError>;
