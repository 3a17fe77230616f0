//! Broker channel ownership and reconnection.
//!
//! One `EventChannel` per process owns the logical link to the message
//! broker: it declares the exchange topology at connect time, hands out
//! the live link to publish/subscribe call sites, and re-establishes it
//! after connection or channel loss. The channel is explicitly owned and
//! passed by handle into `EventPublisher` and `ConsumerRegistry`, so a
//! fake transport can stand in for the broker in tests.
//!
//! # Lifecycle
//!
//! `Disconnected -> Connecting -> Ready`, observable through
//! [`EventChannel::state`]. The cached link is either absent or a valid,
//! error-free handle: close observation clears it so the next
//! [`EventChannel::get_or_reconnect`] dials afresh instead of reusing a
//! dead handle.
//!
//! # Example
//!
//! ```rust,no_run
//! use social_events::{EventChannel, MemoryBroker};
//! use std::sync::Arc;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let channel = Arc::new(EventChannel::new(Arc::new(broker)));
//!
//!     // Fatal at startup if this fails: every downstream feature
//!     // depends on the broker.
//!     channel.connect().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use crate::error::EventsResult;
use crate::retry::{with_retry, RetryConfig};

/// Topology of the single well-known exchange every publish targets.
///
/// There is no direct queue publishing; all routing goes through this
/// exchange by routing key.
#[derive(Debug, Clone)]
pub struct ExchangeTopology {
    /// Exchange name
    pub name: String,

    /// Survive broker restarts
    pub durable: bool,
}

impl Default for ExchangeTopology {
    fn default() -> Self {
        Self {
            name: "facebook_events".to_string(),
            durable: true,
        }
    }
}

/// A message delivered from a bound queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Routing key the message was published under
    pub routing_key: String,

    /// Raw UTF-8 JSON body, exactly as published
    pub body: Vec<u8>,
}

/// Receiving side of an exclusive, server-named queue.
///
/// The queue's lifetime is bound to the link it was declared on: once
/// the link dies, `recv` drains what was already delivered and then
/// returns `None`. Exclusive queues are not durable; a consumer that
/// wants to keep receiving must re-bind on a fresh link.
pub struct MessageQueue {
    pub(crate) name: String,
    pub(crate) receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl MessageQueue {
    /// Server-assigned queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next delivery in broker order, or `None` once the owning link is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// Dial target for a broker: the address plus the means to connect.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Establish a fresh link and declare the exchange topology on it.
    async fn connect(&self, topology: &ExchangeTopology) -> EventsResult<Arc<dyn BrokerLink>>;
}

/// A live link to the broker: one connection and one channel's worth of
/// publish and bind primitives.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// Publish a body to the exchange under `routing_key`. Fire-and-forget:
    /// no broker confirmation is awaited.
    async fn publish(&self, routing_key: &str, body: &[u8]) -> EventsResult<()>;

    /// Declare an exclusive server-named queue and bind it to the exchange
    /// under each of `routing_keys`.
    async fn bind_queue(&self, routing_keys: &[&str]) -> EventsResult<MessageQueue>;

    /// Flips to `true` when the link observes a connection or channel
    /// error/close.
    fn closed(&self) -> watch::Receiver<bool>;

    /// Whether the link is still usable.
    fn is_open(&self) -> bool;
}

/// Channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No live link; the next use will dial
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// A healthy link is cached
    Ready,
}

struct LinkSlot {
    /// Monotonic connect counter; close observation for an old
    /// generation must not clobber a newer link.
    generation: u64,
    link: Option<Arc<dyn BrokerLink>>,
}

/// Process-wide handle to the broker.
pub struct EventChannel {
    transport: Arc<dyn BrokerTransport>,
    topology: ExchangeTopology,
    retry: RetryConfig,
    slot: Arc<Mutex<LinkSlot>>,
    state: Arc<watch::Sender<ChannelState>>,
}

impl EventChannel {
    /// Create a channel with the default topology and reconnect policy.
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self::with_config(transport, ExchangeTopology::default(), RetryConfig::default())
    }

    /// Create a channel with explicit topology and reconnect policy.
    pub fn with_config(
        transport: Arc<dyn BrokerTransport>,
        topology: ExchangeTopology,
        retry: RetryConfig,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            transport,
            topology,
            retry,
            slot: Arc::new(Mutex::new(LinkSlot {
                generation: 0,
                link: None,
            })),
            state: Arc::new(state),
        }
    }

    /// Exchange this channel publishes to.
    pub fn topology(&self) -> &ExchangeTopology {
        &self.topology
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Establish the transport connection, open the link, and declare the
    /// exchange.
    ///
    /// Policy: a failure here at process startup is fatal. Callers should
    /// abort rather than degrade silently, since every downstream feature
    /// depends on the broker. Mid-life the error is recoverable; the next
    /// call retries.
    pub async fn connect(&self) -> EventsResult<Arc<dyn BrokerLink>> {
        self.get_or_reconnect().await
    }

    /// Return the cached link if healthy, otherwise re-run the connect
    /// path.
    ///
    /// Safe to call concurrently from any number of publish/subscribe
    /// call sites: the slot mutex is held across the whole attempt, so
    /// concurrent callers await the in-flight dial instead of opening
    /// duplicate connections (single-flight).
    pub async fn get_or_reconnect(&self) -> EventsResult<Arc<dyn BrokerLink>> {
        let mut slot = self.slot.lock().await;

        if let Some(link) = slot.link.as_ref() {
            if link.is_open() {
                return Ok(link.clone());
            }
            // Stale handle: an error fired since it was cached.
            slot.link = None;
        }

        self.state.send_replace(ChannelState::Connecting);

        match with_retry(&self.retry, || self.transport.connect(&self.topology)).await {
            Ok(link) => {
                slot.generation += 1;
                slot.link = Some(link.clone());
                self.state.send_replace(ChannelState::Ready);
                spawn_close_monitor(
                    self.slot.clone(),
                    self.state.clone(),
                    link.clone(),
                    slot.generation,
                );
                info!(exchange = %self.topology.name, "broker channel ready");
                Ok(link)
            }
            Err(e) => {
                self.state.send_replace(ChannelState::Disconnected);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("topology", &self.topology)
            .field("state", &self.state())
            .finish()
    }
}

/// Clear the cached handle when the link reports closure, so the next
/// `get_or_reconnect` dials afresh.
fn spawn_close_monitor(
    slot: Arc<Mutex<LinkSlot>>,
    state: Arc<watch::Sender<ChannelState>>,
    link: Arc<dyn BrokerLink>,
    generation: u64,
) {
    let mut closed = link.closed();
    tokio::spawn(async move {
        loop {
            if *closed.borrow() {
                break;
            }
            // A dropped sender also counts as closure.
            if closed.changed().await.is_err() {
                break;
            }
        }

        let mut slot = slot.lock().await;
        if slot.generation == generation {
            slot.link = None;
            state.send_replace(ChannelState::Disconnected);
            warn!("broker link lost, will reconnect on next use");
        }
    });
}
