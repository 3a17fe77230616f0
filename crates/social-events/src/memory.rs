//! In-process broker for single-process use and deterministic tests.
//!
//! Implements the same topic-exchange contract as the distributed
//! backends: one exchange, pattern-matched bindings, exclusive
//! server-named queues whose lifetime is the link's lifetime. Test
//! switches simulate connection refusal and link loss.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::channel::{BrokerLink, BrokerTransport, Delivery, ExchangeTopology, MessageQueue};
use crate::error::{EventsError, EventsResult};
use crate::routing::pattern_matches;

struct Binding {
    link_id: u64,
    queue: String,
    patterns: Vec<String>,
    sender: mpsc::UnboundedSender<Delivery>,
}

struct LinkEntry {
    id: u64,
    closed: Arc<watch::Sender<bool>>,
}

#[derive(Default)]
struct BrokerCore {
    bindings: Mutex<Vec<Binding>>,
    links: Mutex<Vec<LinkEntry>>,
    refuse_connections: AtomicBool,
    next_link_id: AtomicU64,
}

impl BrokerCore {
    fn route(&self, routing_key: &str, body: &[u8]) {
        let mut bindings = self.bindings.lock().unwrap();
        bindings.retain(|binding| {
            let matched = binding
                .patterns
                .iter()
                .any(|pattern| pattern_matches(pattern, routing_key));
            if !matched {
                return true;
            }
            let delivery = Delivery {
                routing_key: routing_key.to_string(),
                body: body.to_vec(),
            };
            // A failed send means the queue receiver is gone; drop the binding.
            let delivered = binding.sender.send(delivery).is_ok();
            if !delivered {
                debug!(queue = %binding.queue, "queue receiver gone, dropping binding");
            }
            delivered
        });
    }

    fn drop_link(&self, link_id: u64) {
        self.bindings
            .lock()
            .unwrap()
            .retain(|binding| binding.link_id != link_id);
        let mut links = self.links.lock().unwrap();
        if let Some(entry) = links.iter().find(|entry| entry.id == link_id) {
            entry.closed.send_replace(true);
        }
        links.retain(|entry| entry.id != link_id);
    }
}

/// In-memory topic broker.
///
/// Cloning shares the underlying exchange, so a publisher-side channel
/// and a consumer-side channel built from clones of one broker see each
/// other's traffic, as two processes sharing a broker would.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    core: Arc<BrokerCore>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate broker unavailability: subsequent connects fail until
    /// re-enabled.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.core
            .refuse_connections
            .store(refuse, Ordering::Relaxed);
    }

    /// Simulate a connection-level close: every live link observes a
    /// close event and its exclusive queues end.
    pub fn drop_links(&self) {
        let ids: Vec<u64> = self
            .core
            .links
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.id)
            .collect();
        for id in ids {
            self.core.drop_link(id);
        }
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("bindings", &self.core.bindings.lock().unwrap().len())
            .finish()
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn connect(&self, topology: &ExchangeTopology) -> EventsResult<Arc<dyn BrokerLink>> {
        if self.core.refuse_connections.load(Ordering::Relaxed) {
            return Err(EventsError::BrokerUnavailable(
                "connection refused".to_string(),
            ));
        }

        let id = self.core.next_link_id.fetch_add(1, Ordering::Relaxed);
        let (closed_tx, _) = watch::channel(false);
        let closed = Arc::new(closed_tx);
        self.core.links.lock().unwrap().push(LinkEntry {
            id,
            closed: closed.clone(),
        });

        debug!(exchange = %topology.name, link = id, "declared exchange on new link");

        Ok(Arc::new(MemoryLink {
            id,
            core: self.core.clone(),
            closed,
        }))
    }
}

struct MemoryLink {
    id: u64,
    core: Arc<BrokerCore>,
    closed: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl BrokerLink for MemoryLink {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> EventsResult<()> {
        if !self.is_open() {
            return Err(EventsError::Publish("link closed".to_string()));
        }
        self.core.route(routing_key, body);
        Ok(())
    }

    async fn bind_queue(&self, routing_keys: &[&str]) -> EventsResult<MessageQueue> {
        if !self.is_open() {
            return Err(EventsError::BrokerUnavailable("link closed".to_string()));
        }

        let name = format!("amq.gen-{}", uuid::Uuid::now_v7().simple());
        let (sender, receiver) = mpsc::unbounded_channel();
        self.core.bindings.lock().unwrap().push(Binding {
            link_id: self.id,
            queue: name.clone(),
            patterns: routing_keys.iter().map(|key| key.to_string()).collect(),
            sender,
        });

        debug!(queue = %name, keys = ?routing_keys, "declared exclusive queue");

        Ok(MessageQueue { name, receiver })
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    fn is_open(&self) -> bool {
        !*self.closed.subscribe().borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelState, EventChannel};
    use crate::retry::RetryConfig;

    fn test_channel(broker: &MemoryBroker) -> EventChannel {
        EventChannel::with_config(
            Arc::new(broker.clone()),
            ExchangeTopology::default(),
            RetryConfig::once(),
        )
    }

    #[tokio::test]
    async fn fan_out_delivers_identical_bytes_to_every_bound_queue() {
        let broker = MemoryBroker::new();
        let link = broker
            .connect(&ExchangeTopology::default())
            .await
            .unwrap();

        let mut first = link.bind_queue(&["post.created"]).await.unwrap();
        let mut second = link.bind_queue(&["post.*"]).await.unwrap();

        let body = br#"{"postId":"p1","userId":"u1","content":"hello"}"#;
        link.publish("post.created", body).await.unwrap();

        let got_first = first.recv().await.unwrap();
        let got_second = second.recv().await.unwrap();
        assert_eq!(got_first.body, body.to_vec());
        assert_eq!(got_second.body, body.to_vec());
        assert_eq!(got_first.routing_key, "post.created");
    }

    #[tokio::test]
    async fn bindings_only_match_their_patterns() {
        let broker = MemoryBroker::new();
        let link = broker
            .connect(&ExchangeTopology::default())
            .await
            .unwrap();

        let mut created_only = link.bind_queue(&["post.created"]).await.unwrap();
        link.publish("post.deleted", b"{}").await.unwrap();
        link.publish("post.created", b"{}").await.unwrap();

        let delivery = created_only.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "post.created");
    }

    #[tokio::test]
    async fn dropped_links_end_their_queues() {
        let broker = MemoryBroker::new();
        let link = broker
            .connect(&ExchangeTopology::default())
            .await
            .unwrap();
        let mut queue = link.bind_queue(&["post.created"]).await.unwrap();

        assert!(link.is_open());
        broker.drop_links();

        assert!(!link.is_open());
        assert!(queue.recv().await.is_none());
        assert!(link.publish("post.created", b"{}").await.is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_broker_unavailable() {
        let broker = MemoryBroker::new();
        broker.set_refuse_connections(true);

        let result = broker.connect(&ExchangeTopology::default()).await;
        assert!(matches!(result, Err(EventsError::BrokerUnavailable(_))));
    }

    #[tokio::test]
    async fn channel_reuses_a_healthy_link() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);

        let first = channel.get_or_reconnect().await.unwrap();
        let second = channel.get_or_reconnect().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(channel.state(), ChannelState::Ready);
    }

    #[tokio::test]
    async fn channel_redials_after_link_loss() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);

        let first = channel.get_or_reconnect().await.unwrap();
        broker.drop_links();

        let second = channel.get_or_reconnect().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_open());
    }

    #[tokio::test]
    async fn channel_surfaces_broker_unavailable_and_recovers() {
        let broker = MemoryBroker::new();
        let channel = test_channel(&broker);

        broker.set_refuse_connections(true);
        assert!(channel.get_or_reconnect().await.is_err());
        assert_eq!(channel.state(), ChannelState::Disconnected);

        broker.set_refuse_connections(false);
        assert!(channel.get_or_reconnect().await.is_ok());
        assert_eq!(channel.state(), ChannelState::Ready);
    }
}
