//! Per-service publish façade.

use std::sync::Arc;

use tracing::info;

use crate::channel::EventChannel;
use crate::error::{EventsError, EventsResult};
use crate::types::PostEvent;

/// Serializes domain events and hands them to the event channel with
/// their routing key.
///
/// Publishing is best-effort notification, not a durability guarantee:
/// no broker confirmation is awaited, and the authoritative write to the
/// document store must already have committed before publish.
#[derive(Clone)]
pub struct EventPublisher {
    channel: Arc<EventChannel>,
}

impl EventPublisher {
    /// Create a publisher over an owned channel handle.
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self { channel }
    }

    /// Publish a typed event under its routing key.
    pub async fn publish(&self, event: &PostEvent) -> EventsResult<()> {
        let body = event.to_bytes()?;
        self.publish_raw(event.routing_key(), &body).await?;
        info!(
            routing_key = event.routing_key(),
            post_id = event.post_id(),
            "event published"
        );
        Ok(())
    }

    /// Publish a pre-serialized body under an explicit routing key.
    ///
    /// Used for bodies that must be forwarded byte-for-byte, such as
    /// dead-lettered messages.
    pub async fn publish_raw(&self, routing_key: &str, body: &[u8]) -> EventsResult<()> {
        let link = self
            .channel
            .get_or_reconnect()
            .await
            .map_err(|e| EventsError::Publish(format!("no broker link: {e}")))?;
        link.publish(routing_key, body).await
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("channel", &self.channel)
            .finish()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::channel::{BrokerTransport, ExchangeTopology};
    use crate::memory::MemoryBroker;
    use crate::retry::RetryConfig;
    use crate::types::PostCreated;

    fn channel(broker: &MemoryBroker) -> Arc<EventChannel> {
        Arc::new(EventChannel::with_config(
            Arc::new(broker.clone()),
            ExchangeTopology::default(),
            RetryConfig::once(),
        ))
    }

    #[tokio::test]
    async fn publishes_wire_body_under_routing_key() {
        let broker = MemoryBroker::new();
        let consumer_link = broker
            .connect(&ExchangeTopology::default())
            .await
            .unwrap();
        let mut queue = consumer_link.bind_queue(&["post.created"]).await.unwrap();

        let publisher = EventPublisher::new(channel(&broker));
        let event = PostEvent::Created(PostCreated {
            post_id: "p1".into(),
            user_id: "u1".into(),
            content: "hello".into(),
        });
        publisher.publish(&event).await.unwrap();

        let delivery = queue.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "post.created");
        assert_eq!(delivery.body, event.to_bytes().unwrap());
    }

    #[tokio::test]
    async fn publish_fails_as_publish_error_when_broker_is_down() {
        let broker = MemoryBroker::new();
        broker.set_refuse_connections(true);

        let publisher = EventPublisher::new(channel(&broker));
        let event = PostEvent::Created(PostCreated {
            post_id: "p1".into(),
            user_id: "u1".into(),
            content: "hello".into(),
        });

        let result = publisher.publish(&event).await;
        assert!(matches!(result, Err(EventsError::Publish(_))));
    }

    #[tokio::test]
    async fn publish_transparently_reconnects_after_link_loss() {
        let broker = MemoryBroker::new();
        let publisher = EventPublisher::new(channel(&broker));

        let event = PostEvent::Created(PostCreated {
            post_id: "p1".into(),
            user_id: "u1".into(),
            content: "hello".into(),
        });
        publisher.publish(&event).await.unwrap();

        broker.drop_links();

        // No caller-visible error: the channel re-dials under the hood.
        publisher.publish(&event).await.unwrap();
    }
}
