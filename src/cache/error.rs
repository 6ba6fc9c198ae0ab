//! Error types for ephemeral store operations

use std::fmt;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while talking to the ephemeral store
#[derive(Debug)]
pub enum CacheError {
    /// The backing store is unreachable or failed
    BackendError(String),

    /// Value serialization/deserialization error
    SerializationError(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::BackendError(msg) => write!(f, "ephemeral store error: {}", msg),
            CacheError::SerializationError(msg) => {
                write!(f, "cache value serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}
