//! # Social Content
//!
//! Post service core: schema-validated input arrives from the HTTP
//! layer with a pre-resolved owner id, and this crate runs the write
//! paths (store commit, cache eviction, event publish) and the
//! cache-first read paths against the document store boundary.

pub mod error;
pub mod service;
pub mod store;

// Re-export main types
pub use error::{ContentError, ContentResult};
pub use service::{NewPost, PostService};
pub use store::{Post, PostChanges, PostPage, PostStore};

#[cfg(feature = "memory")]
pub use store::MemoryPostStore;
