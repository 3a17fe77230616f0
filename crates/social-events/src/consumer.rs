//! Consumer registry: queue binding and the delivery loop.
//!
//! Each `subscribe` call declares its own exclusive server-named queue,
//! binds it under a routing key, and runs a delivery loop on a spawned
//! task. Messages are decoded into typed events at this boundary and
//! dispatched one at a time in broker order.
//!
//! A message is considered acknowledged only once its handler has
//! settled: a failing handler is retried with bounded backoff, and after
//! exhaustion the original body is routed to a dead-letter key on the
//! same exchange rather than silently dropped.
//!
//! Exclusive queues do not survive their link. When the link dies the
//! loop re-obtains one from the channel and binds afresh, so consumers
//! keep receiving events published after the reconnect. Events published
//! while the consumer was offline are not redelivered.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::channel::{Delivery, EventChannel, MessageQueue};
use crate::error::{EventsError, EventsResult};
use crate::retry::{with_retry, RetryConfig};
use crate::types::PostEvent;

/// Pause between re-bind rounds when the broker stays unreachable; the
/// channel's own connect retry backs off underneath this.
const REBIND_DELAY: Duration = Duration::from_secs(1);

/// Domain event handler.
///
/// Implementations must be idempotent: applying the same event identity
/// twice must not corrupt state. Handlers run outside any request
/// context, so collaborators (stores, cache handles) are captured at
/// construction.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// React to one decoded event.
    async fn handle(&self, event: PostEvent) -> EventsResult<()>;
}

/// Delivery policy for a registry's subscriptions.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Attempts per message before dead-lettering
    pub handler_retry: RetryConfig,

    /// Routing-key prefix for exhausted messages
    pub dead_letter_prefix: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            handler_retry: RetryConfig::default(),
            dead_letter_prefix: "deadletter".to_string(),
        }
    }
}

/// Per-service consumer façade.
pub struct ConsumerRegistry {
    channel: Arc<EventChannel>,
    config: ConsumerConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConsumerRegistry {
    /// Create a registry with the default delivery policy.
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self::with_config(channel, ConsumerConfig::default())
    }

    /// Create a registry with an explicit delivery policy.
    pub fn with_config(channel: Arc<EventChannel>, config: ConsumerConfig) -> Self {
        Self {
            channel,
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Bind an exclusive queue under `routing_key` and dispatch its
    /// deliveries to `handler`.
    ///
    /// The first bind happens eagerly so broker unavailability surfaces
    /// to the caller. Subscriptions are additive: each call gets its own
    /// queue, so the same routing key can fan out to several independent
    /// handlers within one process.
    pub async fn subscribe(
        &self,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> EventsResult<()> {
        let link = self.channel.get_or_reconnect().await?;
        let queue = link.bind_queue(&[routing_key]).await?;
        info!(routing_key, queue = queue.name(), "subscribed");

        let task = tokio::spawn(subscription_loop(
            self.channel.clone(),
            self.config.clone(),
            routing_key.to_string(),
            handler,
            queue,
        ));
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }

    /// Stop every delivery loop.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Drop for ConsumerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerRegistry")
            .field("subscriptions", &self.tasks.lock().unwrap().len())
            .finish()
    }
}

async fn subscription_loop(
    channel: Arc<EventChannel>,
    config: ConsumerConfig,
    routing_key: String,
    handler: Arc<dyn EventHandler>,
    mut queue: MessageQueue,
) {
    loop {
        while let Some(delivery) = queue.recv().await {
            dispatch(&channel, &config, handler.as_ref(), delivery).await;
        }

        // The queue ended, which means the link died. Exclusive queues do
        // not survive it; keep the subscription alive on a fresh link.
        warn!(routing_key = %routing_key, "delivery queue closed, rebinding");
        queue = rebind(&channel, &routing_key).await;
    }
}

async fn rebind(channel: &EventChannel, routing_key: &str) -> MessageQueue {
    loop {
        let bound = match channel.get_or_reconnect().await {
            Ok(link) => link.bind_queue(&[routing_key]).await,
            Err(e) => Err(e),
        };
        match bound {
            Ok(queue) => {
                info!(routing_key, queue = queue.name(), "re-bound after link loss");
                return queue;
            }
            Err(e) => {
                error!(routing_key, error = %e, "re-bind failed, will retry");
                sleep(REBIND_DELAY).await;
            }
        }
    }
}

async fn dispatch(
    channel: &EventChannel,
    config: &ConsumerConfig,
    handler: &dyn EventHandler,
    delivery: Delivery,
) {
    let event = match PostEvent::from_wire(&delivery.routing_key, &delivery.body) {
        Ok(event) => event,
        Err(e) => {
            // A poison message cannot succeed on retry; drop it.
            warn!(
                routing_key = %delivery.routing_key,
                error = %e,
                "dropping undecodable message"
            );
            return;
        }
    };

    let outcome = with_retry(&config.handler_retry, || handler.handle(event.clone())).await;

    if let Err(e) = outcome {
        error!(
            routing_key = %delivery.routing_key,
            post_id = event.post_id(),
            error = %e,
            "handler exhausted retries, dead-lettering message"
        );
        dead_letter(channel, config, &delivery).await;
    }
}

/// Route an exhausted message's original body to the dead-letter key so
/// it is auditable instead of silently lost.
async fn dead_letter(channel: &EventChannel, config: &ConsumerConfig, delivery: &Delivery) {
    let key = format!("{}.{}", config.dead_letter_prefix, delivery.routing_key);
    let published = match channel.get_or_reconnect().await {
        Ok(link) => link.publish(&key, &delivery.body).await,
        Err(e) => Err(e),
    };
    if let Err(e) = published {
        error!(routing_key = %key, error = %e, "failed to dead-letter message");
    }
}
