use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_bus::{BusConfig, BusConnector, BusMessage};

use crate::Event;
use crate::config::OverflowPolicy;
use crate::forward::{ForwardError, Forwarder};
use crate::store::MetadataStore;

/// Why a subscription task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// Connecting or subscribing failed; the topic is abandoned.
    SetupFailed,
    /// The bus closed the subscription.
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue full under [`OverflowPolicy::Drop`].
    Dropped,
    /// Worker is gone.
    Closed,
}

/// Sending half of a topic's delivery queue.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    topic: String,
    tx: mpsc::Sender<Event>,
    overflow: OverflowPolicy,
}

impl DeliveryQueue {
    /// Enqueue an event. Under back-pressure this waits for room.
    pub async fn push(&self, event: Event) -> PushOutcome {
        match self.overflow {
            OverflowPolicy::Drop => match self.tx.try_send(event) {
                Ok(()) => PushOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(topic = %self.topic, "delivery queue full, dropping event");
                    PushOutcome::Dropped
                }
                Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::Closed,
            },
            OverflowPolicy::BackPressure => match self.tx.send(event).await {
                Ok(()) => PushOutcome::Queued,
                Err(_) => PushOutcome::Closed,
            },
        }
    }
}

/// Spawn the worker that POSTs a topic's events one at a time.
pub fn spawn_delivery_worker(
    topic: String,
    forwarder: Arc<Forwarder>,
    buffer: usize,
    overflow: OverflowPolicy,
    token: CancellationToken,
) -> (DeliveryQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Event>(buffer.max(1));
    let queue = DeliveryQueue {
        topic: topic.clone(),
        tx,
        overflow,
    };

    let handle = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = token.cancelled() => break,
            };

            match forwarder.deliver(&event, &topic, &token).await {
                Ok(delivery) => tracing::info!(
                    topic = %topic,
                    url = %delivery.url,
                    status = %delivery.status,
                    body = %delivery.body,
                    "metadata delivered"
                ),
                Err(ForwardError::Cancelled(_)) => break,
                Err(e) => tracing::error!(topic = %topic, error = %e, "metadata delivery failed"),
            }
        }
        tracing::info!(topic = %topic, "delivery worker stopped");
    });

    (queue, handle)
}

/// Attach the topic name to an incoming event.
pub fn tag_event(message: BusMessage, topic: &str) -> Event {
    let mut event = message.data;
    event.insert("topic".to_string(), Value::String(topic.to_string()));
    event
}

/// Spawn the task that subscribes to `topic` and feeds the store and the
/// optional delivery queue.
pub fn spawn_subscription(
    connector: Arc<dyn BusConnector>,
    bus: BusConfig,
    topic: String,
    store: Arc<MetadataStore>,
    queue: Option<DeliveryQueue>,
    token: CancellationToken,
) -> JoinHandle<TaskExit> {
    tokio::spawn(async move {
        let setup = async {
            let client = connector.connect(&bus).await?;
            client.subscribe(&topic).await
        };
        let mut sub = tokio::select! {
            result = setup => match result {
                Ok(sub) => sub,
                Err(e) => {
                    tracing::error!(topic = %topic, bus = %bus, error = %e, "subscription setup failed");
                    return TaskExit::SetupFailed;
                }
            },
            _ = token.cancelled() => return TaskExit::Cancelled,
        };
        tracing::info!(topic = %topic, bus = %bus, "subscribed");

        loop {
            let received = tokio::select! {
                received = sub.recv() => received,
                _ = token.cancelled() => return TaskExit::Cancelled,
            };

            let message = match received {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::error!(topic = %topic, error = %e, "receive error");
                    continue;
                }
                None => {
                    tracing::info!(topic = %topic, "subscription closed");
                    return TaskExit::Closed;
                }
            };

            let event = tag_event(message, &topic);
            tracing::debug!(topic = %topic, "received metadata");
            store.publish(&topic, event.clone());

            if let Some(queue) = &queue {
                tokio::select! {
                    _ = queue.push(event) => {}
                    _ = token.cancelled() => return TaskExit::Cancelled,
                }
            }
        }
    })
}
