//! Media upload and listing.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::MediaResult;
use crate::store::{BlobStore, Media, MediaStore};

/// Media service core: blob upload plus metadata bookkeeping. Upload
/// validation (size, type) happens upstream.
pub struct MediaService {
    media: Arc<dyn MediaStore>,
    blobs: Arc<dyn BlobStore>,
}

impl MediaService {
    /// Wire the service over its collaborators.
    pub fn new(media: Arc<dyn MediaStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { media, blobs }
    }

    /// Upload bytes to the blob store and record the metadata.
    pub async fn upload_media(
        &self,
        user_id: &str,
        bytes: &[u8],
        original_name: &str,
        mime_type: &str,
    ) -> MediaResult<Media> {
        let blob = self.blobs.upload(bytes, original_name, mime_type).await?;
        let media = self
            .media
            .insert(Media {
                id: uuid::Uuid::now_v7().to_string(),
                user_id: user_id.to_string(),
                blob_id: blob.id,
                url: blob.url,
                original_name: original_name.to_string(),
                mime_type: mime_type.to_string(),
                created_at: Utc::now(),
            })
            .await?;

        info!(media_id = %media.id, user_id, "media uploaded");
        Ok(media)
    }

    /// All media owned by `user_id`, newest first.
    pub async fn get_all_media(&self, user_id: &str) -> MediaResult<Vec<Media>> {
        self.media.find_for_user(user_id).await
    }
}

impl std::fmt::Debug for MediaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaService").finish()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryMediaStore};

    #[tokio::test]
    async fn upload_stores_blob_and_metadata() {
        let media = Arc::new(MemoryMediaStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let service = MediaService::new(media, blobs.clone());

        let uploaded = service
            .upload_media("u1", b"bytes", "photo.jpg", "image/jpeg")
            .await
            .unwrap();

        assert_eq!(uploaded.user_id, "u1");
        assert_eq!(uploaded.original_name, "photo.jpg");
        assert_eq!(blobs.blob_ids().await, vec![uploaded.blob_id.clone()]);

        let listed = service.get_all_media("u1").await.unwrap();
        assert_eq!(listed, vec![uploaded]);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_owner() {
        let media = Arc::new(MemoryMediaStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let service = MediaService::new(media, blobs);

        service
            .upload_media("u1", b"a", "a.jpg", "image/jpeg")
            .await
            .unwrap();
        service
            .upload_media("u2", b"b", "b.jpg", "image/jpeg")
            .await
            .unwrap();

        let listed = service.get_all_media("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, "u1");
    }
}
