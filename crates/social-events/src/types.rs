//! Typed domain events and their wire format.
//!
//! Message bodies are the bare UTF-8 JSON objects the services exchange;
//! the routing key is the discriminant. Decoding happens once, at the
//! consumer registry boundary, so handlers never see untyped data.

use serde::{Deserialize, Serialize};

use crate::error::{EventsError, EventsResult};

/// Routing key for post creation events.
pub const POST_CREATED_KEY: &str = "post.created";

/// Routing key for post deletion events.
pub const POST_DELETED_KEY: &str = "post.deleted";

/// Body of a `post.created` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreated {
    /// Post identifier
    pub post_id: String,

    /// Owner of the post
    pub user_id: String,

    /// Post body, denormalized for search indexing
    pub content: String,
}

/// Body of a `post.deleted` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleted {
    /// Post identifier
    pub post_id: String,

    /// Owner of the post
    pub user_id: String,

    /// Media attached to the post at deletion time
    #[serde(default)]
    pub media_ids: Vec<String>,
}

/// Domain event union.
///
/// Event identity is `(routing key, post id)`: a handler must treat
/// redelivery of the same identity as a no-op if already applied.
/// Events are immutable once published; the occurrence time is implicit
/// at publish and not carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostEvent {
    /// A post was created
    Created(PostCreated),
    /// A post was deleted
    Deleted(PostDeleted),
}

impl PostEvent {
    /// Routing key this event is published under.
    pub fn routing_key(&self) -> &'static str {
        match self {
            PostEvent::Created(_) => POST_CREATED_KEY,
            PostEvent::Deleted(_) => POST_DELETED_KEY,
        }
    }

    /// Identifier of the post the event concerns.
    pub fn post_id(&self) -> &str {
        match self {
            PostEvent::Created(body) => &body.post_id,
            PostEvent::Deleted(body) => &body.post_id,
        }
    }

    /// Owner of the post the event concerns.
    pub fn user_id(&self) -> &str {
        match self {
            PostEvent::Created(body) => &body.user_id,
            PostEvent::Deleted(body) => &body.user_id,
        }
    }

    /// Serialize the event body to its JSON wire form.
    pub fn to_bytes(&self) -> EventsResult<Vec<u8>> {
        let bytes = match self {
            PostEvent::Created(body) => serde_json::to_vec(body)?,
            PostEvent::Deleted(body) => serde_json::to_vec(body)?,
        };
        Ok(bytes)
    }

    /// Decode a message body for the given routing key.
    pub fn from_wire(routing_key: &str, body: &[u8]) -> EventsResult<Self> {
        let decode = |source| EventsError::Decode {
            routing_key: routing_key.to_string(),
            source,
        };
        match routing_key {
            POST_CREATED_KEY => serde_json::from_slice(body)
                .map(PostEvent::Created)
                .map_err(decode),
            POST_DELETED_KEY => serde_json::from_slice(body)
                .map(PostEvent::Deleted)
                .map_err(decode),
            other => Err(EventsError::UnknownRoutingKey(other.to_string())),
        }
    }
}
