//! Cache store client.
//!
//! Thin wrapper over a shared key-value store: get, set with TTL,
//! delete, delete by prefix. Values are serialized JSON strings; keys
//! are namespaced by logical resource and query parameters
//! (`posts:<page>:<limit>`, `posts:<id>`, `searchPosts:<term>`).

#[cfg(feature = "memory")]
use std::collections::HashMap;
use std::time::Duration;
#[cfg(feature = "memory")]
use std::time::Instant;

use async_trait::async_trait;
#[cfg(feature = "memory")]
use tokio::sync::RwLock;

use crate::error::CacheResult;

/// Key-value cache store boundary.
///
/// Reads and writes are independent per key; there is no transactional
/// multi-key guarantee.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value, `None` on miss or expiry.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove one key.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Remove every key starting with `prefix` in one batch. Returns
    /// the number of keys removed.
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;
}

/// In-process cache store.
///
/// Entries expire lazily on read. Suitable for single-process use and
/// deterministic tests.
#[cfg(feature = "memory")]
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

#[cfg(feature = "memory")]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

#[cfg(feature = "memory")]
impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "memory")]
impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore").finish()
    }
}

#[cfg(feature = "memory")]
#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}
