use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::client::{
    BusClient, BusConfig, BusConnector, BusFuture, BusSubscription, ServiceRequester,
};
use crate::error::BusError;
use crate::message::BusMessage;

type ServiceHandler =
    Arc<dyn Fn(BusMessage) -> BusFuture<'static, Result<BusMessage, BusError>> + Send + Sync>;

/// In-process bus: broadcast topics plus registered service handlers.
///
/// Acts as its own connector, so every bus config resolves to the same
/// instance.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    services: RwLock<HashMap<String, ServiceHandler>>,
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MemoryBus {
    /// `capacity` is the per-topic broadcast buffer; slow subscribers past
    /// it observe [`BusError::Lagged`].
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                topics: RwLock::new(HashMap::new()),
                services: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        let mut topics = match self.inner.topics.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }

    /// Publish to a topic. Returns how many subscribers received it.
    pub fn publish(&self, topic: &str, message: BusMessage) -> usize {
        self.sender(topic).send(message).unwrap_or(0)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = match self.inner.topics.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        topics.get(topic).map_or(0, |tx| tx.receiver_count())
    }

    /// Register (or replace) the handler answering requests to `name`.
    pub fn register_service<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BusMessage, BusError>> + Send + 'static,
    {
        let boxed: ServiceHandler = Arc::new(
            move |msg| -> BusFuture<'static, Result<BusMessage, BusError>> { Box::pin(handler(msg)) },
        );
        let mut services = match self.inner.services.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        services.insert(name.to_string(), boxed);
    }

    fn handler(&self, name: &str) -> Option<ServiceHandler> {
        let services = match self.inner.services.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        services.get(name).cloned()
    }
}

impl BusConnector for MemoryBus {
    fn connect(&self, _config: &BusConfig) -> BusFuture<'_, Result<Arc<dyn BusClient>, BusError>> {
        let bus = self.clone();
        Box::pin(async move { Ok(Arc::new(bus) as Arc<dyn BusClient>) })
    }
}

impl BusClient for MemoryBus {
    fn subscribe(&self, topic: &str) -> BusFuture<'_, Result<Box<dyn BusSubscription>, BusError>> {
        let rx = self.sender(topic).subscribe();
        let topic = topic.to_string();
        Box::pin(async move { Ok(Box::new(MemorySubscription { topic, rx }) as Box<dyn BusSubscription>) })
    }

    fn service(&self, name: &str) -> BusFuture<'_, Result<Arc<dyn ServiceRequester>, BusError>> {
        let found = self.handler(name).map(|handler| MemoryService {
            name: name.to_string(),
            handler,
        });
        let name = name.to_string();
        Box::pin(async move {
            found
                .map(|svc| Arc::new(svc) as Arc<dyn ServiceRequester>)
                .ok_or(BusError::ServiceNotFound(name))
        })
    }
}

struct MemorySubscription {
    topic: String,
    rx: broadcast::Receiver<BusMessage>,
}

impl BusSubscription for MemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn recv(&mut self) -> BusFuture<'_, Option<Result<BusMessage, BusError>>> {
        Box::pin(async move {
            match self.rx.recv().await {
                Ok(msg) => Some(Ok(msg)),
                Err(broadcast::error::RecvError::Lagged(n)) => Some(Err(BusError::Lagged(n))),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        })
    }
}

struct MemoryService {
    name: String,
    handler: ServiceHandler,
}

impl ServiceRequester for MemoryService {
    fn service(&self) -> &str {
        &self.name
    }

    fn request(&self, request: BusMessage) -> BusFuture<'_, Result<BusMessage, BusError>> {
        (self.handler)(request)
    }
}
