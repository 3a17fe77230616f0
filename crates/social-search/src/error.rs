//! Error types for the search service core.

use thiserror::Error;

/// Search service error types.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The search store failed
    #[error("search store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for search service operations.
pub type SearchResult<T> = Result<T, SearchError>;

impl SearchError {
    /// Wrap an arbitrary search store failure.
    pub fn store(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SearchError::Store(err.into())
    }
}
