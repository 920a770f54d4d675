//! Error types for keytree
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for keytree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for keytree
#[derive(Debug, Error)]
pub enum Error {
    // Store transport errors
    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("store request timed out")]
    Timeout,

    #[error("tls error: {0}")]
    Tls(String),

    #[error("not connected to the store")]
    NotConnected,

    // Key errors
    #[error("The node does not exist.")]
    NotFound { key: String },

    #[error("malformed key {key:?}: {reason}")]
    MalformedKey { key: String, reason: String },

    // Request errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a not found error for a key
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a malformed key error
    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a retryable error.
    ///
    /// Nothing in keytree retries on its own; callers use this to decide.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_) | Self::NotConnected)
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get the HTTP status code reported to the browsing UI
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidArgument(_) | Self::MalformedKey { .. } => 400,

            // 404 Not Found
            Self::NotFound { .. } => 404,

            // 500 Internal Server Error
            Self::Configuration(_) | Self::Serialization(_) | Self::Internal(_) => 500,

            // 502 Bad Gateway
            Self::Transport(_) | Self::Tls(_) => 502,

            // 503 Service Unavailable
            Self::NotConnected => 503,

            // 504 Gateway Timeout
            Self::Timeout => 504,
        }
    }
}
