//! Media cleanup on post deletion.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use social_events::{EventHandler, EventsError, EventsResult, PostEvent};

use crate::store::{BlobStore, MediaStore};

/// Removes the media attached to a deleted post: remote blob first,
/// then the local metadata record.
///
/// Idempotent: a media id that no longer has a record is treated as
/// already handled, so redelivery of the same `post.deleted` event is a
/// no-op. Per-item failures are logged and the batch continues; partial
/// completion is acceptable because the remainder is retried on
/// redelivery or picked up out of band.
pub struct MediaCleanupHandler {
    media: Arc<dyn MediaStore>,
    blobs: Arc<dyn BlobStore>,
}

impl MediaCleanupHandler {
    /// Wire the handler over its collaborators.
    pub fn new(media: Arc<dyn MediaStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { media, blobs }
    }
}

#[async_trait]
impl EventHandler for MediaCleanupHandler {
    async fn handle(&self, event: PostEvent) -> EventsResult<()> {
        let PostEvent::Deleted(deleted) = event else {
            return Ok(());
        };

        let found = self
            .media
            .find_by_ids(&deleted.media_ids)
            .await
            .map_err(EventsError::handler)?;

        if found.len() < deleted.media_ids.len() {
            debug!(
                post_id = %deleted.post_id,
                missing = deleted.media_ids.len() - found.len(),
                "some media ids already handled"
            );
        }

        for media in found {
            if let Err(e) = self.blobs.delete(&media.blob_id).await {
                warn!(media_id = %media.id, error = %e, "failed to delete blob, continuing");
                continue;
            }
            if let Err(e) = self.media.delete_by_id(&media.id).await {
                warn!(media_id = %media.id, error = %e, "failed to delete media record, continuing");
                continue;
            }
            info!(
                media_id = %media.id,
                post_id = %deleted.post_id,
                "deleted media for removed post"
            );
        }

        Ok(())
    }
}
