//! Cached search reads.

use std::sync::Arc;

use tracing::{debug, warn};

use social_cache::{search_key, CacheStore, DEFAULT_TTL};

use crate::error::SearchResult;
use crate::store::{SearchRecord, SearchStore};

/// Search service core: term lookup with read-through caching.
pub struct SearchService {
    store: Arc<dyn SearchStore>,
    cache: Arc<dyn CacheStore>,
}

impl SearchService {
    /// Wire the service over its collaborators.
    pub fn new(store: Arc<dyn SearchStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { store, cache }
    }

    /// Posts matching `term`, newest first, cache-first.
    pub async fn search_posts(&self, term: &str) -> SearchResult<Vec<SearchRecord>> {
        let cache_key = search_key(term);

        match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(records) => {
                    debug!(term, "search results loaded from cache");
                    return Ok(records);
                }
                Err(e) => {
                    warn!(term, error = %e, "corrupt cache entry, falling back to store");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(term, error = %e, "cache read failed, falling back to store");
            }
        }

        let records = self.store.search(term).await?;

        match serde_json::to_string(&records) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&cache_key, &raw, DEFAULT_TTL).await {
                    warn!(term, error = %e, "cache write failed");
                }
            }
            Err(e) => warn!(term, error = %e, "failed to serialize search results"),
        }

        Ok(records)
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService").finish()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::store::MemorySearchStore;
    use chrono::Utc;
    use social_cache::MemoryCacheStore;

    async fn seed(store: &MemorySearchStore, post_id: &str, content: &str) {
        store
            .upsert(SearchRecord {
                post_id: post_id.to_string(),
                user_id: "u1".to_string(),
                content: content.to_string(),
                indexed_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn search_matches_content_and_populates_cache() {
        let store = Arc::new(MemorySearchStore::new());
        let cache = Arc::new(MemoryCacheStore::new());
        seed(&store, "p1", "hello world").await;
        seed(&store, "p2", "something else").await;

        let service = SearchService::new(store, cache.clone());
        let results = service.search_posts("hello").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].post_id, "p1");
        assert!(cache.get("searchPosts:hello").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cached_results_are_served_until_evicted() {
        let store = Arc::new(MemorySearchStore::new());
        let cache = Arc::new(MemoryCacheStore::new());
        seed(&store, "p1", "hello").await;

        let service = SearchService::new(store.clone(), cache);
        let first = service.search_posts("hello").await.unwrap();

        // New content behind the cache's back stays invisible until the
        // entry is evicted (handlers evict on post.created).
        seed(&store, "p2", "hello again").await;
        let second = service.search_posts("hello").await.unwrap();
        assert_eq!(first, second);
    }
}
