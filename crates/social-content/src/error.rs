//! Error types for the post service core.

use thiserror::Error;

/// Post service error types.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The post does not exist or is not owned by the caller
    #[error("post not found")]
    NotFound,

    /// An update was requested with no fields to change
    #[error("no fields to update: specify content or mediaIds")]
    NoChanges,

    /// The document store failed
    #[error("document store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for post service operations.
pub type ContentResult<T> = Result<T, ContentError>;

impl ContentError {
    /// Wrap an arbitrary document store failure.
    pub fn store(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ContentError::Store(err.into())
    }
}
