//! Redis-backed broker transport for distributed deployments.
//!
//! Redis has no exchange entity, so the topology maps onto pub/sub
//! channel names: a publish under routing key `k` goes to the channel
//! `<exchange>:<k>`, and a bound queue psubscribes to `<exchange>:*`
//! and filters deliveries through its binding patterns client-side.
//! Exclusive queues map to dedicated pub/sub connections, which gives
//! them the same lifetime-of-the-link semantics as the broker-native
//! backends: nothing published while a consumer is offline is retained.
//!
//! # Example
//!
//! ```rust,no_run
//! use social_events::redis::{RedisBroker, RedisBrokerConfig};
//! use social_events::EventChannel;
//! use std::sync::Arc;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = RedisBroker::new(RedisBrokerConfig::default());
//!     let channel = EventChannel::new(Arc::new(broker));
//!     channel.connect().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::channel::{BrokerLink, BrokerTransport, Delivery, ExchangeTopology, MessageQueue};
use crate::error::{EventsError, EventsResult};
use crate::routing::pattern_matches;

/// Redis transport configuration.
#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    /// Redis connection URL (e.g., `redis://localhost:6379`)
    pub url: String,
}

impl Default for RedisBrokerConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        }
    }
}

/// Redis-backed broker transport.
#[derive(Debug, Clone)]
pub struct RedisBroker {
    config: RedisBrokerConfig,
}

impl RedisBroker {
    /// Create a transport for the given configuration.
    pub fn new(config: RedisBrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrokerTransport for RedisBroker {
    async fn connect(&self, topology: &ExchangeTopology) -> EventsResult<Arc<dyn BrokerLink>> {
        let client = Client::open(self.config.url.as_str())
            .map_err(|e| EventsError::BrokerUnavailable(e.to_string()))?;

        // Test the connection up front; a bad address should fail the
        // connect, not the first publish.
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| EventsError::BrokerUnavailable(e.to_string()))?;

        let (closed_tx, _) = watch::channel(false);

        info!(exchange = %topology.name, "connected to redis broker");

        Ok(Arc::new(RedisLink {
            client,
            conn,
            exchange: topology.name.clone(),
            closed: Arc::new(closed_tx),
        }))
    }
}

struct RedisLink {
    client: Client,
    conn: MultiplexedConnection,
    exchange: String,
    closed: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl BrokerLink for RedisLink {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> EventsResult<()> {
        if !self.is_open() {
            return Err(EventsError::Publish("link closed".to_string()));
        }

        let channel = format!("{}:{}", self.exchange, routing_key);
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(&channel, body).await.map_err(|e| {
            // Command-level IO failure means the connection is gone;
            // flag the link so the channel dials afresh next time.
            self.closed.send_replace(true);
            EventsError::Publish(e.to_string())
        })?;

        debug!(channel = %channel, "published to redis");
        Ok(())
    }

    async fn bind_queue(&self, routing_keys: &[&str]) -> EventsResult<MessageQueue> {
        if !self.is_open() {
            return Err(EventsError::BrokerUnavailable("link closed".to_string()));
        }

        // Dedicated pub/sub connection per queue: the redis analogue of
        // an exclusive server-named queue.
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| EventsError::BrokerUnavailable(e.to_string()))?;

        let prefix = format!("{}:", self.exchange);
        pubsub
            .psubscribe(format!("{prefix}*"))
            .await
            .map_err(|e| EventsError::BrokerUnavailable(e.to_string()))?;

        let name = format!("redis.gen-{}", uuid::Uuid::now_v7().simple());
        let patterns: Vec<String> = routing_keys.iter().map(|key| key.to_string()).collect();
        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = self.closed.clone();
        let queue_name = name.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let Some(routing_key) = channel.strip_prefix(&prefix) else {
                    continue;
                };
                if !patterns
                    .iter()
                    .any(|pattern| pattern_matches(pattern, routing_key))
                {
                    continue;
                }

                let body: Vec<u8> = match msg.get_payload() {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(queue = %queue_name, error = %e, "failed to read message payload");
                        continue;
                    }
                };

                let delivery = Delivery {
                    routing_key: routing_key.to_string(),
                    body,
                };
                if sender.send(delivery).is_err() {
                    // Queue receiver dropped; stop listening.
                    return;
                }
            }

            // The pub/sub stream ended: the underlying connection is gone.
            warn!(queue = %queue_name, "redis pub/sub stream ended");
            closed.send_replace(true);
        });

        Ok(MessageQueue { name, receiver })
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    fn is_open(&self) -> bool {
        !*self.closed.subscribe().borrow()
    }
}
