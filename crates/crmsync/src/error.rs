//! Error types for the sync engine
//!
//! Two layers: `SyncError` for runtime failures that abort the current run
//! (invalid configuration, unreachable destination), and `SourceError` for
//! individual source requests, which carries the retryable/terminal
//! classification the fetch layer acts on. Record-scoped mapping failures
//! live in [`crate::mapper::MapError`] and never escalate past their batch.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that abort the current sync run
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration invalid at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Destination store unreachable or rejected a statement outside
    /// row scope
    #[error("destination error: {0}")]
    Destination(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown requested
    #[error("shutdown requested")]
    Shutdown,
}

impl SyncError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a destination error
    pub fn destination(msg: impl Into<String>) -> Self {
        Self::Destination(msg.into())
    }

    /// Check if this is a shutdown error
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// Errors from a single source API request
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (connect, DNS, broken stream)
    #[error("connection error: {0}")]
    Connection(String),

    /// Request exceeded the client timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// The source rejected the request to shed load
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Server-side failure, may succeed on retry
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The source rejected the request itself; retrying cannot help
    #[error("api error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Response did not match the expected envelope shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
