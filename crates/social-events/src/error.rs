//! Error types for the event layer.

use thiserror::Error;

/// Event layer error types.
///
/// `BrokerUnavailable` is fatal at process startup (every downstream
/// feature depends on the broker) and recoverable mid-life: the next
/// publish or subscribe re-runs the connect path.
#[derive(Debug, Error)]
pub enum EventsError {
    /// The broker connection or channel could not be established
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// A publish could not be handed to the broker
    #[error("failed to publish event: {0}")]
    Publish(String),

    /// An inbound message body could not be decoded
    #[error("failed to decode event body for routing key {routing_key}")]
    Decode {
        /// Routing key the message arrived under.
        routing_key: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A message arrived under a routing key no event type maps to
    #[error("no event type bound to routing key {0}")]
    UnknownRoutingKey(String),

    /// Event serialization failed
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A domain event handler failed
    #[error("event handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The broker link was lost mid-operation
    #[error("broker link closed")]
    LinkClosed,
}

/// Result type for event layer operations.
pub type EventsResult<T> = Result<T, EventsError>;

impl EventsError {
    /// Wrap an arbitrary handler failure.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        EventsError::Handler(err.into())
    }
}
