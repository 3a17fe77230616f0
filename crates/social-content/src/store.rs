//! Post records and the document store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use crate::error::ContentResult;

/// A post as stored and as cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Post identifier
    pub id: String,

    /// Owner of the post
    pub user_id: String,

    /// Post body
    pub content: String,

    /// Attached media identifiers
    #[serde(default)]
    pub media_ids: Vec<String>,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// One page of a user's posts, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    /// Posts on this page
    pub posts: Vec<Post>,

    /// 1-based page number
    pub current_page: u64,

    /// Total number of pages
    pub total_pages: u64,

    /// Total number of posts for the user
    pub total: u64,
}

/// Partial update of a post. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    /// Replacement body
    pub content: Option<String>,

    /// Replacement media id list
    pub media_ids: Option<Vec<String>>,
}

impl PostChanges {
    /// Whether any field would change.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.media_ids.is_none()
    }
}

/// Document store boundary for posts.
///
/// The query layer behind this is a black box; everything is keyed by
/// post id and owner id.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a new post.
    async fn create(&self, post: Post) -> ContentResult<Post>;

    /// Fetch a page of the owner's posts, newest first.
    async fn find_page(&self, user_id: &str, skip: u64, limit: u64) -> ContentResult<Vec<Post>>;

    /// Count the owner's posts.
    async fn count_for_user(&self, user_id: &str) -> ContentResult<u64>;

    /// Fetch one post owned by `user_id`.
    async fn find_one(&self, post_id: &str, user_id: &str) -> ContentResult<Option<Post>>;

    /// Apply a partial update. Returns `false` when no matching post
    /// exists.
    async fn update_one(
        &self,
        post_id: &str,
        user_id: &str,
        changes: &PostChanges,
    ) -> ContentResult<bool>;

    /// Delete one post. Returns `false` when no matching post exists.
    async fn delete_one(&self, post_id: &str, user_id: &str) -> ContentResult<bool>;
}

/// In-process post store for single-process use and tests.
#[cfg(feature = "memory")]
#[derive(Debug, Default)]
pub struct MemoryPostStore {
    posts: tokio::sync::RwLock<Vec<Post>>,
}

#[cfg(feature = "memory")]
impl MemoryPostStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "memory")]
#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create(&self, post: Post) -> ContentResult<Post> {
        let mut posts = self.posts.write().await;
        posts.push(post.clone());
        Ok(post)
    }

    async fn find_page(&self, user_id: &str, skip: u64, limit: u64) -> ContentResult<Vec<Post>> {
        let posts = self.posts.read().await;
        let mut owned: Vec<Post> = posts
            .iter()
            .filter(|post| post.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_for_user(&self, user_id: &str) -> ContentResult<u64> {
        let posts = self.posts.read().await;
        Ok(posts.iter().filter(|post| post.user_id == user_id).count() as u64)
    }

    async fn find_one(&self, post_id: &str, user_id: &str) -> ContentResult<Option<Post>> {
        let posts = self.posts.read().await;
        Ok(posts
            .iter()
            .find(|post| post.id == post_id && post.user_id == user_id)
            .cloned())
    }

    async fn update_one(
        &self,
        post_id: &str,
        user_id: &str,
        changes: &PostChanges,
    ) -> ContentResult<bool> {
        let mut posts = self.posts.write().await;
        let Some(post) = posts
            .iter_mut()
            .find(|post| post.id == post_id && post.user_id == user_id)
        else {
            return Ok(false);
        };
        if let Some(content) = &changes.content {
            post.content = content.clone();
        }
        if let Some(media_ids) = &changes.media_ids {
            post.media_ids = media_ids.clone();
        }
        Ok(true)
    }

    async fn delete_one(&self, post_id: &str, user_id: &str) -> ContentResult<bool> {
        let mut posts = self.posts.write().await;
        let before = posts.len();
        posts.retain(|post| !(post.id == post_id && post.user_id == user_id));
        Ok(posts.len() < before)
    }
}
