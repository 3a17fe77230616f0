//! Error types for the media service core.

use thiserror::Error;

/// Media service error types.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The blob store failed
    #[error("blob store error: {0}")]
    Blob(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The metadata store failed
    #[error("media store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for media service operations.
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Wrap an arbitrary blob store failure.
    pub fn blob(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        MediaError::Blob(err.into())
    }

    /// Wrap an arbitrary metadata store failure.
    pub fn store(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        MediaError::Store(err.into())
    }
}
