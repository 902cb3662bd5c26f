//! Image fetch error types.

use thiserror::Error;

/// Result type for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Errors surfaced by the loading pipeline.
///
/// `Clone` so that every caller coalesced onto one fetch observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport did not yield an HTTP-shaped response.
    #[error("invalid response: not an HTTP response")]
    InvalidResponse,

    /// Response status outside 200..=299.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Payload bytes do not decode to an image.
    #[error("unable to decode image: {0}")]
    Decode(String),

    /// Persistent storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Resource known not to exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure (connection, timeout, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// The background fetch task did not complete.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns the HTTP status carried by the error, if any.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns whether a caller-side retry might succeed.
    ///
    /// The pipeline itself never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::HttpStatus(code) => matches!(*code, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}
