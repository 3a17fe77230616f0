//! # Social Events
//!
//! Cross-service event propagation for the social platform: the channel
//! to the message broker, the publish façade the write paths use, and
//! the consumer registry the media and search services react through.
//!
//! ## Overview
//!
//! - **Event Channel**: one durable logical broker link per process,
//!   with single-flight reconnection and observable lifecycle
//! - **Publisher**: serializes typed domain events and routes them
//!   through the platform's topic exchange
//! - **Consumer Registry**: exclusive queue per subscription, typed
//!   decode at the boundary, bounded handler retry, dead-lettering
//! - **Typed Events**: `PostEvent` tagged union; the routing key is the
//!   wire discriminant
//!
//! ## Features
//!
//! - `memory` (default): in-process broker for single-process use and
//!   deterministic tests
//! - `redis`: redis-backed transport for distributed deployments
//!
//! ## Delivery semantics
//!
//! At-least-once while subscribed, effectively-once through idempotent
//! handlers. Queues are exclusive and non-durable: events published
//! while a consumer is offline are not redelivered to it. Ordering is
//! guaranteed only per routing key within a single link's publish
//! order.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use social_events::{
//!     EventChannel, EventPublisher, MemoryBroker, PostCreated, PostEvent,
//! };
//! use std::sync::Arc;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let channel = Arc::new(EventChannel::new(Arc::new(broker)));
//!     channel.connect().await?;
//!
//!     let publisher = EventPublisher::new(channel);
//!     publisher
//!         .publish(&PostEvent::Created(PostCreated {
//!             post_id: "p1".into(),
//!             user_id: "u1".into(),
//!             content: "hello".into(),
//!         }))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod consumer;
pub mod error;
pub mod publish;
pub mod retry;
pub mod routing;
pub mod types;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

// Re-export main types
pub use channel::{
    BrokerLink, BrokerTransport, ChannelState, Delivery, EventChannel, ExchangeTopology,
    MessageQueue,
};
pub use consumer::{ConsumerConfig, ConsumerRegistry, EventHandler};
pub use error::{EventsError, EventsResult};
pub use publish::EventPublisher;
pub use retry::{with_retry, RetryConfig};
pub use types::{PostCreated, PostDeleted, PostEvent, POST_CREATED_KEY, POST_DELETED_KEY};

#[cfg(feature = "memory")]
pub use memory::MemoryBroker;

#[cfg(feature = "redis")]
pub use redis::{RedisBroker, RedisBrokerConfig};
