//! Denormalized search records and the search store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use crate::error::SearchResult;

/// A post denormalized for search, keyed by post id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    /// Post identifier
    pub post_id: String,

    /// Owner of the post
    pub user_id: String,

    /// Post body, matched against search terms
    pub content: String,

    /// Indexing time
    pub indexed_at: DateTime<Utc>,
}

/// Search store boundary.
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Insert or replace the record for `record.post_id`.
    async fn upsert(&self, record: SearchRecord) -> SearchResult<()>;

    /// Remove the record for `(post_id, user_id)`. Returns `false`
    /// when no record existed.
    async fn remove(&self, post_id: &str, user_id: &str) -> SearchResult<bool>;

    /// All records whose content matches `term`, newest first.
    async fn search(&self, term: &str) -> SearchResult<Vec<SearchRecord>>;
}

/// In-process search store for single-process use and tests. Matching
/// is case-insensitive substring containment.
#[cfg(feature = "memory")]
#[derive(Debug, Default)]
pub struct MemorySearchStore {
    records: tokio::sync::RwLock<Vec<SearchRecord>>,
}

#[cfg(feature = "memory")]
impl MemorySearchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(feature = "memory")]
#[async_trait]
impl SearchStore for MemorySearchStore {
    async fn upsert(&self, record: SearchRecord) -> SearchResult<()> {
        let mut records = self.records.write().await;
        records.retain(|existing| existing.post_id != record.post_id);
        records.push(record);
        Ok(())
    }

    async fn remove(&self, post_id: &str, user_id: &str) -> SearchResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !(record.post_id == post_id && record.user_id == user_id));
        Ok(records.len() < before)
    }

    async fn search(&self, term: &str) -> SearchResult<Vec<SearchRecord>> {
        let needle = term.to_lowercase();
        let records = self.records.read().await;
        let mut matched: Vec<SearchRecord> = records
            .iter()
            .filter(|record| record.content.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        Ok(matched)
    }
}
