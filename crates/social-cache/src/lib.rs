//! # Social Cache
//!
//! Query cache layer for the social platform services: a thin client
//! over a shared key-value store plus the invalidation policy the write
//! paths and event handlers apply.
//!
//! ## Discipline
//!
//! Reads go cache-first and fall back to the authoritative store on
//! miss or cache failure, repopulating with a TTL (300s). Writes evict
//! the affected detail key and the full list prefix before success is
//! acknowledged to the caller. Cache unavailability never fails a
//! user-visible operation.
//!
//! ## Features
//!
//! - `memory` (default): in-process store for single-process use and
//!   deterministic tests
//! - `redis`: shared redis-backed store

pub mod error;
pub mod invalidate;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis;

// Re-export main types
pub use error::{CacheError, CacheResult};
pub use invalidate::{
    post_detail_key, post_list_key, search_key, CacheInvalidator, DEFAULT_TTL, POSTS_NAMESPACE,
    SEARCH_NAMESPACE,
};
pub use store::CacheStore;

#[cfg(feature = "memory")]
pub use store::MemoryCacheStore;

#[cfg(feature = "redis")]
pub use redis::{RedisCacheConfig, RedisCacheStore};
