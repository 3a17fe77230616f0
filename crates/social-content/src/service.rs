//! Post write and read paths.
//!
//! Reads consult the cache before the document store and repopulate on
//! miss. Writes commit to the store first, evict the affected cache
//! keys before acknowledging success, and then publish the domain
//! event. A publish failure on an already-committed write is logged
//! rather than surfaced: the store is authoritative and availability
//! wins over delivery. Cache failures likewise never fail a request.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use social_cache::{
    post_detail_key, post_list_key, CacheInvalidator, CacheStore, DEFAULT_TTL, POSTS_NAMESPACE,
};
use social_events::{EventPublisher, PostCreated, PostDeleted, PostEvent};

use crate::error::{ContentError, ContentResult};
use crate::store::{Post, PostChanges, PostPage, PostStore};

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_LIMIT: u64 = 10;

/// New post input, validated upstream.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Post body
    pub content: String,

    /// Attached media identifiers
    pub media_ids: Vec<String>,
}

/// Post service core.
///
/// The caller's owner id arrives pre-resolved by the identity layer;
/// it is trusted here without re-verification.
pub struct PostService {
    store: Arc<dyn PostStore>,
    cache: Arc<dyn CacheStore>,
    invalidator: CacheInvalidator,
    publisher: EventPublisher,
}

impl PostService {
    /// Wire the service over its collaborators.
    pub fn new(
        store: Arc<dyn PostStore>,
        cache: Arc<dyn CacheStore>,
        publisher: EventPublisher,
    ) -> Self {
        let invalidator = CacheInvalidator::new(cache.clone(), POSTS_NAMESPACE);
        Self {
            store,
            cache,
            invalidator,
            publisher,
        }
    }

    /// Create a post, evict stale cache entries, and announce it.
    pub async fn create_post(&self, user_id: &str, new_post: NewPost) -> ContentResult<Post> {
        let post = self
            .store
            .create(Post {
                id: uuid::Uuid::now_v7().to_string(),
                user_id: user_id.to_string(),
                content: new_post.content,
                media_ids: new_post.media_ids,
                created_at: Utc::now(),
            })
            .await?;
        info!(post_id = %post.id, user_id, "post created");

        self.invalidate_post_cache(&post.id).await;

        let event = PostEvent::Created(PostCreated {
            post_id: post.id.clone(),
            user_id: post.user_id.clone(),
            content: post.content.clone(),
        });
        if let Err(e) = self.publisher.publish(&event).await {
            // The write is committed; losing the event is accepted.
            error!(post_id = %post.id, error = %e, "failed to publish post.created");
        }

        Ok(post)
    }

    /// Fetch a page of the owner's posts, newest first, cache-first.
    pub async fn list_posts(&self, user_id: &str, page: u64, limit: u64) -> ContentResult<PostPage> {
        let page = if page == 0 { DEFAULT_PAGE } else { page };
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

        let cache_key = post_list_key(page, limit);
        if let Some(hit) = self.cache_get::<PostPage>(&cache_key).await {
            return Ok(hit);
        }

        let skip = (page - 1) * limit;
        let posts = self.store.find_page(user_id, skip, limit).await?;
        let total = self.store.count_for_user(user_id).await?;
        let result = PostPage {
            posts,
            current_page: page,
            total_pages: total.div_ceil(limit),
            total,
        };

        self.cache_put(&cache_key, &result).await;
        Ok(result)
    }

    /// Fetch one post, cache-first.
    pub async fn get_post(&self, user_id: &str, post_id: &str) -> ContentResult<Post> {
        let cache_key = post_detail_key(post_id);
        if let Some(hit) = self.cache_get::<Post>(&cache_key).await {
            return Ok(hit);
        }

        let post = self
            .store
            .find_one(post_id, user_id)
            .await?
            .ok_or(ContentError::NotFound)?;

        self.cache_put(&cache_key, &post).await;
        Ok(post)
    }

    /// Apply a partial update and evict stale cache entries.
    pub async fn update_post(
        &self,
        user_id: &str,
        post_id: &str,
        changes: PostChanges,
    ) -> ContentResult<()> {
        if changes.is_empty() {
            return Err(ContentError::NoChanges);
        }

        let updated = self.store.update_one(post_id, user_id, &changes).await?;
        if !updated {
            return Err(ContentError::NotFound);
        }

        info!(post_id, user_id, "post updated");
        self.invalidate_post_cache(post_id).await;
        Ok(())
    }

    /// Delete a post, announce it with its media ids, and evict stale
    /// cache entries.
    pub async fn delete_post(&self, user_id: &str, post_id: &str) -> ContentResult<()> {
        let post = self
            .store
            .find_one(post_id, user_id)
            .await?
            .ok_or(ContentError::NotFound)?;

        let deleted = self.store.delete_one(post_id, user_id).await?;
        if !deleted {
            return Err(ContentError::NotFound);
        }
        info!(post_id, user_id, "post deleted");

        let event = PostEvent::Deleted(PostDeleted {
            post_id: post.id.clone(),
            user_id: post.user_id.clone(),
            media_ids: post.media_ids.clone(),
        });
        if let Err(e) = self.publisher.publish(&event).await {
            error!(post_id, error = %e, "failed to publish post.deleted");
        }

        self.invalidate_post_cache(post_id).await;
        Ok(())
    }

    /// Evict the single-entity key plus the full list prefix. List
    /// results depend on pagination over the whole collection, so they
    /// are never patched in place.
    async fn invalidate_post_cache(&self, post_id: &str) {
        self.invalidator.invalidate_logged(post_id).await;
        self.invalidator.invalidate_all_logged().await;
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key, "loaded from cache");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "corrupt cache entry, falling back to store");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, falling back to store");
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize cache value");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &raw, DEFAULT_TTL).await {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

impl std::fmt::Debug for PostService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostService").finish()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::store::MemoryPostStore;
    use async_trait::async_trait;
    use social_cache::{CacheError, CacheResult, MemoryCacheStore};
    use social_events::{
        BrokerTransport, EventChannel, ExchangeTopology, MemoryBroker, RetryConfig,
    };
    use std::time::Duration;

    struct Fixture {
        broker: MemoryBroker,
        store: Arc<MemoryPostStore>,
        cache: Arc<MemoryCacheStore>,
        service: PostService,
    }

    fn fixture() -> Fixture {
        let broker = MemoryBroker::new();
        let channel = Arc::new(EventChannel::with_config(
            Arc::new(broker.clone()),
            ExchangeTopology::default(),
            RetryConfig::once(),
        ));
        let store = Arc::new(MemoryPostStore::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let service = PostService::new(
            store.clone(),
            cache.clone(),
            EventPublisher::new(channel),
        );
        Fixture {
            broker,
            store,
            cache,
            service,
        }
    }

    fn new_post(content: &str) -> NewPost {
        NewPost {
            content: content.to_string(),
            media_ids: vec!["m1".to_string()],
        }
    }

    #[tokio::test]
    async fn create_publishes_post_created() {
        let fx = fixture();
        let link = fx
            .broker
            .connect(&ExchangeTopology::default())
            .await
            .unwrap();
        let mut queue = link.bind_queue(&["post.created"]).await.unwrap();

        let post = fx.service.create_post("u1", new_post("hello")).await.unwrap();

        let delivery = queue.recv().await.unwrap();
        let event = PostEvent::from_wire(&delivery.routing_key, &delivery.body).unwrap();
        assert_eq!(event.post_id(), post.id);
        assert_eq!(event.user_id(), "u1");
    }

    #[tokio::test]
    async fn list_read_repopulates_cache_and_create_evicts_it() {
        let fx = fixture();
        fx.service.create_post("u1", new_post("first")).await.unwrap();

        let page = fx.service.list_posts("u1", 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(fx.cache.get("posts:1:10").await.unwrap().is_some());

        // A write for the owning user evicts the list entry immediately.
        fx.service.create_post("u1", new_post("second")).await.unwrap();
        assert!(fx.cache.get("posts:1:10").await.unwrap().is_none());

        // The next read misses and repopulates.
        let page = fx.service.list_posts("u1", 1, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(fx.cache.get("posts:1:10").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_is_served_from_cache_once_populated() {
        let fx = fixture();
        fx.service.create_post("u1", new_post("hello")).await.unwrap();
        let first = fx.service.list_posts("u1", 1, 10).await.unwrap();

        // Mutate the store behind the cache's back; the cached page wins
        // until eviction or expiry.
        fx.store.delete_one(&first.posts[0].id, "u1").await.unwrap();
        let second = fx.service.list_posts("u1", 1, 10).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn get_post_round_trips_through_detail_cache() {
        let fx = fixture();
        let post = fx.service.create_post("u1", new_post("hello")).await.unwrap();

        let fetched = fx.service.get_post("u1", &post.id).await.unwrap();
        assert_eq!(fetched, post);
        assert!(fx
            .cache
            .get(&format!("posts:{}", post.id))
            .await
            .unwrap()
            .is_some());

        let again = fx.service.get_post("u1", &post.id).await.unwrap();
        assert_eq!(again, post);
    }

    #[tokio::test]
    async fn get_post_for_other_user_is_not_found() {
        let fx = fixture();
        let post = fx.service.create_post("u1", new_post("hello")).await.unwrap();

        let result = fx.service.get_post("u2", &post.id).await;
        assert!(matches!(result, Err(ContentError::NotFound)));
    }

    #[tokio::test]
    async fn update_requires_some_change() {
        let fx = fixture();
        let post = fx.service.create_post("u1", new_post("hello")).await.unwrap();

        let result = fx
            .service
            .update_post("u1", &post.id, PostChanges::default())
            .await;
        assert!(matches!(result, Err(ContentError::NoChanges)));
    }

    #[tokio::test]
    async fn update_evicts_the_detail_entry() {
        let fx = fixture();
        let post = fx.service.create_post("u1", new_post("hello")).await.unwrap();
        fx.service.get_post("u1", &post.id).await.unwrap();

        fx.service
            .update_post(
                "u1",
                &post.id,
                PostChanges {
                    content: Some("edited".to_string()),
                    media_ids: None,
                },
            )
            .await
            .unwrap();

        assert!(fx
            .cache
            .get(&format!("posts:{}", post.id))
            .await
            .unwrap()
            .is_none());
        let fetched = fx.service.get_post("u1", &post.id).await.unwrap();
        assert_eq!(fetched.content, "edited");
    }

    #[tokio::test]
    async fn delete_publishes_media_ids_and_evicts() {
        let fx = fixture();
        let link = fx
            .broker
            .connect(&ExchangeTopology::default())
            .await
            .unwrap();
        let mut queue = link.bind_queue(&["post.deleted"]).await.unwrap();

        let post = fx.service.create_post("u1", new_post("hello")).await.unwrap();
        fx.service.get_post("u1", &post.id).await.unwrap();
        fx.service.delete_post("u1", &post.id).await.unwrap();

        let delivery = queue.recv().await.unwrap();
        match PostEvent::from_wire(&delivery.routing_key, &delivery.body).unwrap() {
            PostEvent::Deleted(deleted) => {
                assert_eq!(deleted.post_id, post.id);
                assert_eq!(deleted.media_ids, vec!["m1".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(fx
            .cache
            .get(&format!("posts:{}", post.id))
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            fx.service.get_post("u1", &post.id).await,
            Err(ContentError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_of_missing_post_is_not_found() {
        let fx = fixture();
        let result = fx.service.delete_post("u1", "missing").await;
        assert!(matches!(result, Err(ContentError::NotFound)));
    }

    /// Cache store that always fails, to exercise the fallback policy.
    struct DownCache;

    #[async_trait]
    impl CacheStore for DownCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> CacheResult<u64> {
            Err(CacheError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn requests_survive_an_unavailable_cache() {
        let broker = MemoryBroker::new();
        let channel = Arc::new(EventChannel::with_config(
            Arc::new(broker),
            ExchangeTopology::default(),
            RetryConfig::once(),
        ));
        let store = Arc::new(MemoryPostStore::new());
        let service = PostService::new(store, Arc::new(DownCache), EventPublisher::new(channel));

        let post = service.create_post("u1", new_post("hello")).await.unwrap();
        let page = service.list_posts("u1", 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        let fetched = service.get_post("u1", &post.id).await.unwrap();
        assert_eq!(fetched.id, post.id);
        service.delete_post("u1", &post.id).await.unwrap();
    }

    #[tokio::test]
    async fn writes_survive_an_unavailable_broker() {
        let broker = MemoryBroker::new();
        broker.set_refuse_connections(true);
        let channel = Arc::new(EventChannel::with_config(
            Arc::new(broker),
            ExchangeTopology::default(),
            RetryConfig::once(),
        ));
        let store = Arc::new(MemoryPostStore::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let service = PostService::new(store, cache, EventPublisher::new(channel));

        // The event is lost, the write is not.
        let post = service.create_post("u1", new_post("hello")).await.unwrap();
        assert_eq!(service.get_post("u1", &post.id).await.unwrap().id, post.id);
    }
}
