//! Media records and the blob/metadata store boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use crate::error::MediaResult;

/// Stored media metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// Media identifier
    pub id: String,

    /// Owner of the media
    pub user_id: String,

    /// Identifier of the remote blob
    pub blob_id: String,

    /// Public URL of the remote blob
    pub url: String,

    /// Original upload file name
    pub original_name: String,

    /// MIME type of the upload
    pub mime_type: String,

    /// Upload time
    pub created_at: DateTime<Utc>,
}

/// Reference returned by a completed blob upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    /// Blob identifier for later deletion
    pub id: String,

    /// Public URL
    pub url: String,
}

/// Remote blob storage boundary (upload and delete only; internals are
/// out of scope).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload raw bytes, returning the blob reference.
    async fn upload(&self, bytes: &[u8], name: &str, mime_type: &str) -> MediaResult<BlobRef>;

    /// Delete a blob. Deleting a blob that no longer exists is a no-op.
    async fn delete(&self, blob_id: &str) -> MediaResult<()>;
}

/// Document store boundary for media metadata.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist a new record.
    async fn insert(&self, media: Media) -> MediaResult<Media>;

    /// Fetch records by media id. Unknown ids are simply absent from
    /// the result.
    async fn find_by_ids(&self, ids: &[String]) -> MediaResult<Vec<Media>>;

    /// Fetch all records owned by `user_id`, newest first.
    async fn find_for_user(&self, user_id: &str) -> MediaResult<Vec<Media>>;

    /// Delete one record. Returns `false` when it did not exist.
    async fn delete_by_id(&self, id: &str) -> MediaResult<bool>;
}

/// In-process media store for single-process use and tests.
#[cfg(feature = "memory")]
#[derive(Debug, Default)]
pub struct MemoryMediaStore {
    records: tokio::sync::RwLock<Vec<Media>>,
}

#[cfg(feature = "memory")]
impl MemoryMediaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "memory")]
#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn insert(&self, media: Media) -> MediaResult<Media> {
        let mut records = self.records.write().await;
        records.push(media.clone());
        Ok(media)
    }

    async fn find_by_ids(&self, ids: &[String]) -> MediaResult<Vec<Media>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|media| ids.contains(&media.id))
            .cloned()
            .collect())
    }

    async fn find_for_user(&self, user_id: &str) -> MediaResult<Vec<Media>> {
        let records = self.records.read().await;
        let mut owned: Vec<Media> = records
            .iter()
            .filter(|media| media.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn delete_by_id(&self, id: &str) -> MediaResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|media| media.id != id);
        Ok(records.len() < before)
    }
}

/// In-process blob store for single-process use and tests. Remembers
/// deletions so tests can assert cleanup happened.
#[cfg(feature = "memory")]
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: tokio::sync::RwLock<Vec<String>>,
}

#[cfg(feature = "memory")]
impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blob ids currently held.
    pub async fn blob_ids(&self) -> Vec<String> {
        self.blobs.read().await.clone()
    }
}

#[cfg(feature = "memory")]
#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, _bytes: &[u8], name: &str, _mime_type: &str) -> MediaResult<BlobRef> {
        let id = uuid::Uuid::now_v7().to_string();
        self.blobs.write().await.push(id.clone());
        Ok(BlobRef {
            url: format!("memory://blobs/{id}/{name}"),
            id,
        })
    }

    async fn delete(&self, blob_id: &str) -> MediaResult<()> {
        // Absent ids are already gone; deletion stays a no-op.
        self.blobs.write().await.retain(|id| id != blob_id);
        Ok(())
    }
}
