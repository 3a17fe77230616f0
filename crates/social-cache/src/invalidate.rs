//! Cache invalidation policy.
//!
//! One `CacheInvalidator` capability, parameterized by a store handle
//! and a namespace. Request paths and event handlers are just two call
//! sites of the same interface: a request-scoped handle or one captured
//! at handler construction, it makes no difference here.
//!
//! Write paths must evict BEFORE acknowledging success to the caller,
//! never after. A concurrent reader can still repopulate a key from a
//! stale store read between eviction and the store write becoming
//! visible; that staleness window is accepted and bounded by the TTL.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CacheResult;
use crate::store::CacheStore;

/// TTL applied to list, detail, and search reads.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Namespace for post list and detail keys.
pub const POSTS_NAMESPACE: &str = "posts";

/// Namespace for search result keys.
pub const SEARCH_NAMESPACE: &str = "searchPosts";

/// Key for a page of a user's posts.
pub fn post_list_key(page: u64, limit: u64) -> String {
    format!("{POSTS_NAMESPACE}:{page}:{limit}")
}

/// Key for a single post.
pub fn post_detail_key(post_id: &str) -> String {
    format!("{POSTS_NAMESPACE}:{post_id}")
}

/// Key for one search term's results.
pub fn search_key(term: &str) -> String {
    format!("{SEARCH_NAMESPACE}:{term}")
}

/// Evicts cache entries for one namespace.
#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
    namespace: String,
}

impl CacheInvalidator {
    /// Create an invalidator for `namespace` over the given store handle.
    pub fn new(store: Arc<dyn CacheStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Namespace this invalidator evicts under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Delete one entry: `<namespace>:<key>`.
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let full_key = format!("{}:{}", self.namespace, key);
        self.store.delete(&full_key).await?;
        debug!(key = %full_key, "cache entry evicted");
        Ok(())
    }

    /// Delete every entry under `<namespace>:*` in one batch.
    ///
    /// List results depend on pagination and sort over the whole
    /// collection, so they are never selectively patched; search
    /// results are fully invalidated because new content can affect any
    /// ranked query.
    pub async fn invalidate_all(&self) -> CacheResult<u64> {
        let prefix = format!("{}:", self.namespace);
        let removed = self.store.delete_prefix(&prefix).await?;
        debug!(prefix = %prefix, removed, "cache namespace evicted");
        Ok(removed)
    }

    /// Best-effort variant for write paths: invalidation failure must
    /// not fail the user-visible operation.
    pub async fn invalidate_logged(&self, key: &str) {
        if let Err(e) = self.invalidate(key).await {
            warn!(namespace = %self.namespace, key, error = %e, "cache invalidation failed");
        }
    }

    /// Best-effort variant of [`CacheInvalidator::invalidate_all`].
    pub async fn invalidate_all_logged(&self) {
        if let Err(e) = self.invalidate_all().await {
            warn!(namespace = %self.namespace, error = %e, "cache invalidation failed");
        }
    }
}

impl std::fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidator")
            .field("namespace", &self.namespace)
            .finish()
    }
}
