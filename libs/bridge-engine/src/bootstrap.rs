use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_bus::BusConnector;

use crate::config::BridgeConfig;
use crate::credentials::CredentialBundle;
use crate::error::EngineError;
use crate::forward::Forwarder;
use crate::image::ImageProxy;
use crate::probe::ReadinessProber;
use crate::store::MetadataStore;
use crate::subscription::{TaskExit, spawn_delivery_worker, spawn_subscription};

/// Subscription task handle, keyed by topic.
struct TopicSlot {
    topic: String,
    subscription: JoinHandle<TaskExit>,
    delivery: Option<JoinHandle<()>>,
}

/// The running bridge: subscription tasks, delivery workers and the state
/// the HTTP server reads.
pub struct Bridge {
    store: Arc<MetadataStore>,
    image: Option<Arc<ImageProxy>>,
    credentials: Option<Arc<CredentialBundle>>,
    slots: Vec<TopicSlot>,
    token: CancellationToken,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("topics", &self.topics())
            .field("image", &self.image)
            .field("secured", &self.credentials.is_some())
            .finish()
    }
}

impl Bridge {
    /// Build credentials, then spawn one subscription task (plus a delivery
    /// worker when forwarding is on) per configured topic.
    ///
    /// Credential and forwarder errors are fatal. A topic whose bus cannot
    /// be reached only ends its own task; an unreachable image store leaves
    /// the proxy absent.
    pub async fn bootstrap(
        config: &BridgeConfig,
        connector: Arc<dyn BusConnector>,
        token: CancellationToken,
    ) -> Result<Self, EngineError> {
        // --- 1. Credentials ---
        let credentials = if config.secured() {
            let tls = config.tls.as_ref().ok_or_else(|| {
                EngineError::Config("[tls] is required when dev_mode = false".to_string())
            })?;
            let bundle = CredentialBundle::build(&tls.load_material()?)?;
            bundle.write_server_files(&config.server.cert_path, &config.server.key_path)?;
            tracing::info!(
                inbound_anchors = bundle.inbound_trust_anchors(),
                outbound_anchors = bundle.outbound_trust_anchors(),
                "loaded tls credentials"
            );
            Some(Arc::new(bundle))
        } else {
            tracing::warn!("dev mode: tls disabled for inbound and outbound http");
            None
        };

        // --- 2. Forwarder ---
        let forwarder = if config.delivery.enabled {
            let delivery = &config.delivery;
            let prober = ReadinessProber::new(
                Duration::from_millis(delivery.probe_interval_ms),
                Duration::from_millis(delivery.probe_timeout_ms),
            );
            let timeout = Duration::from_secs(delivery.request_timeout_secs);
            let forwarder = match &credentials {
                Some(bundle) => Forwarder::secured(config.endpoints.clone(), bundle, prober, timeout)?,
                None => Forwarder::plain(config.endpoints.clone(), prober, timeout)?,
            };
            Some(Arc::new(forwarder))
        } else {
            None
        };

        // --- 3. Subscriptions ---
        let store = Arc::new(MetadataStore::new());
        let mut slots = Vec::new();
        for (topic, bus) in config.topics() {
            let (queue, delivery) = match &forwarder {
                Some(forwarder) => {
                    let (queue, handle) = spawn_delivery_worker(
                        topic.to_string(),
                        forwarder.clone(),
                        config.delivery.buffer,
                        config.delivery.overflow,
                        token.clone(),
                    );
                    (Some(queue), Some(handle))
                }
                None => (None, None),
            };
            let subscription = spawn_subscription(
                connector.clone(),
                bus.clone(),
                topic.to_string(),
                store.clone(),
                queue,
                token.clone(),
            );
            tracing::info!(topic, bus = %bus, forwarding = forwarder.is_some(), "spawned subscription");
            slots.push(TopicSlot {
                topic: topic.to_string(),
                subscription,
                delivery,
            });
        }

        // --- 4. Image store ---
        let image = match &config.image_store {
            Some(cfg) => match ImageProxy::connect(connector.as_ref(), cfg).await {
                Ok(proxy) => Some(Arc::new(proxy)),
                Err(e) => {
                    tracing::error!(service = %cfg.service, error = %e, "image store unavailable");
                    None
                }
            },
            None => None,
        };

        Ok(Bridge {
            store,
            image,
            credentials,
            slots,
            token,
        })
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    pub fn image(&self) -> Option<&Arc<ImageProxy>> {
        self.image.as_ref()
    }

    pub fn credentials(&self) -> Option<&Arc<CredentialBundle>> {
        self.credentials.as_ref()
    }

    pub fn topics(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.topic.as_str()).collect()
    }

    /// Cancel every task, wait up to `drain` for them to finish, then abort
    /// what is left. Returns how each subscription ended, `None` when it had
    /// to be aborted.
    pub async fn shutdown(self, drain: Duration) -> Vec<(String, Option<TaskExit>)> {
        self.token.cancel();
        let deadline = tokio::time::Instant::now() + drain;

        let mut exits = Vec::with_capacity(self.slots.len());
        for mut slot in self.slots {
            let exit = match tokio::time::timeout_at(deadline, &mut slot.subscription).await {
                Ok(Ok(exit)) => Some(exit),
                Ok(Err(e)) => {
                    tracing::error!(topic = %slot.topic, error = %e, "subscription task panicked");
                    None
                }
                Err(_) => {
                    tracing::warn!(topic = %slot.topic, "subscription did not stop in time, aborting");
                    slot.subscription.abort();
                    None
                }
            };

            if let Some(mut delivery) = slot.delivery {
                if tokio::time::timeout_at(deadline, &mut delivery).await.is_err() {
                    tracing::warn!(topic = %slot.topic, "delivery worker did not stop in time, aborting");
                    delivery.abort();
                }
            }
            exits.push((slot.topic, exit));
        }

        tracing::info!("bridge shut down");
        exits
    }
}
