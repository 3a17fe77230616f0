//! # Social Media
//!
//! Media service core: upload bookkeeping over the blob store boundary,
//! and the idempotent cleanup handler that reacts to post deletions
//! announced on the event bus.

pub mod error;
pub mod handler;
pub mod service;
pub mod store;

// Re-export main types
pub use error::{MediaError, MediaResult};
pub use handler::MediaCleanupHandler;
pub use service::MediaService;
pub use store::{BlobRef, BlobStore, Media, MediaStore};

#[cfg(feature = "memory")]
pub use store::{MemoryBlobStore, MemoryMediaStore};
