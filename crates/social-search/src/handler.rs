//! Search index maintenance on post lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use social_cache::{CacheInvalidator, CacheStore, SEARCH_NAMESPACE};
use social_events::{EventHandler, EventsError, EventsResult, PostEvent};

use crate::store::{SearchRecord, SearchStore};

/// Keeps the denormalized search index in step with post events.
///
/// On `post.created` the record is upserted and the whole search result
/// cache is evicted: new content can affect any ranked query, so point
/// invalidation is not enough. On `post.deleted` the record is removed;
/// removing a record that is already gone is a no-op, which makes
/// redelivery safe.
///
/// The handler runs outside any request context, so the cache handle is
/// captured at construction rather than taken per request.
pub struct SearchIndexHandler {
    store: Arc<dyn SearchStore>,
    invalidator: CacheInvalidator,
}

impl SearchIndexHandler {
    /// Wire the handler over the search store and an explicit cache
    /// handle.
    pub fn new(store: Arc<dyn SearchStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            invalidator: CacheInvalidator::new(cache, SEARCH_NAMESPACE),
        }
    }
}

#[async_trait]
impl EventHandler for SearchIndexHandler {
    async fn handle(&self, event: PostEvent) -> EventsResult<()> {
        match event {
            PostEvent::Created(created) => {
                self.store
                    .upsert(SearchRecord {
                        post_id: created.post_id.clone(),
                        user_id: created.user_id,
                        content: created.content,
                        indexed_at: Utc::now(),
                    })
                    .await
                    .map_err(EventsError::handler)?;
                info!(post_id = %created.post_id, "indexed post for search");

                self.invalidator.invalidate_all_logged().await;
                Ok(())
            }
            PostEvent::Deleted(deleted) => {
                let removed = self
                    .store
                    .remove(&deleted.post_id, &deleted.user_id)
                    .await
                    .map_err(EventsError::handler)?;
                if removed {
                    info!(post_id = %deleted.post_id, "removed post from search index");
                } else {
                    debug!(post_id = %deleted.post_id, "no matching search record");
                }
                Ok(())
            }
        }
    }
}
