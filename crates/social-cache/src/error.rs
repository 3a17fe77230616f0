//! Error types for cache operations.

use thiserror::Error;

/// Cache layer error types.
///
/// Cache failures are never allowed to fail a user-visible operation:
/// read paths fall back to the authoritative store, and write paths
/// log-and-continue when invalidation fails.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache store is unreachable
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be serialized or deserialized
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
