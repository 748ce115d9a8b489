use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::BusError;
use crate::frame::DEFAULT_MAX_FRAME_BYTES;
use crate::message::BusMessage;

pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Connection parameters
// ---------------------------------------------------------------------------

/// Connection parameters for one bus endpoint. Each subscriber and the image
/// store carry their own.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusConfig {
    Tcp(TcpBusConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TcpBusConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Delay before re-dialing a dropped subscriber connection.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
fn default_reconnect_interval_ms() -> u64 {
    1000
}

impl TcpBusConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_frame_bytes: default_max_frame_bytes(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for BusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusConfig::Tcp(cfg) => write!(f, "tcp://{}", cfg.addr()),
        }
    }
}

// ---------------------------------------------------------------------------
// Client traits
// ---------------------------------------------------------------------------

/// A live subscription to one topic.
pub trait BusSubscription: Send {
    fn topic(&self) -> &str;

    /// Wait for the next event on the subscription.
    ///
    /// `Some(Ok)` is a message, `Some(Err)` is a subscription error (the
    /// subscription stays usable), `None` means the subscription is closed.
    fn recv(&mut self) -> BusFuture<'_, Option<Result<BusMessage, BusError>>>;
}

/// Synchronous request/response channel to a named bus service.
pub trait ServiceRequester: Send + Sync {
    fn service(&self) -> &str;

    fn request(&self, request: BusMessage) -> BusFuture<'_, Result<BusMessage, BusError>>;
}

/// A connected bus client.
pub trait BusClient: Send + Sync {
    fn subscribe(&self, topic: &str) -> BusFuture<'_, Result<Box<dyn BusSubscription>, BusError>>;

    fn service(&self, name: &str) -> BusFuture<'_, Result<Arc<dyn ServiceRequester>, BusError>>;
}

/// Creates bus clients from connection parameters.
pub trait BusConnector: Send + Sync {
    fn connect(&self, config: &BusConfig) -> BusFuture<'_, Result<Arc<dyn BusClient>, BusError>>;
}
