use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::client::{
    BusClient, BusConfig, BusConnector, BusFuture, BusSubscription, ServiceRequester, TcpBusConfig,
};
use crate::error::BusError;
use crate::frame;
use crate::message::BusMessage;

/// Connector for `type = "tcp"` bus configs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl BusConnector for TcpConnector {
    fn connect(&self, config: &BusConfig) -> BusFuture<'_, Result<Arc<dyn BusClient>, BusError>> {
        let config = config.clone();
        Box::pin(async move {
            match config {
                BusConfig::Tcp(cfg) => Ok(Arc::new(TcpBusClient::new(cfg)) as Arc<dyn BusClient>),
            }
        })
    }
}

/// Bus client speaking length-prefixed JSON envelopes over TCP.
#[derive(Debug, Clone)]
pub struct TcpBusClient {
    config: TcpBusConfig,
}

impl TcpBusClient {
    pub fn new(config: TcpBusConfig) -> Self {
        Self { config }
    }
}

async fn dial(config: &TcpBusConfig) -> Result<TcpStream, BusError> {
    let addr = config.addr();
    TcpStream::connect(&addr)
        .await
        .map_err(|source| BusError::Connect { addr, source })
}

/// Dial the publisher and announce which topic we want.
async fn open_subscription(config: &TcpBusConfig, topic: &str) -> Result<TcpStream, BusError> {
    let mut stream = dial(config).await?;
    let mut data = Map::new();
    data.insert("subscribe".to_string(), Value::String(topic.to_string()));
    frame::write_message(&mut stream, &BusMessage::new(data)).await?;
    Ok(stream)
}

impl BusClient for TcpBusClient {
    fn subscribe(&self, topic: &str) -> BusFuture<'_, Result<Box<dyn BusSubscription>, BusError>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let stream = open_subscription(&self.config, &topic).await?;
            tracing::debug!(topic = %topic, addr = %self.config.addr(), "tcp subscriber connected");
            Ok(Box::new(TcpSubscription {
                topic,
                config: self.config.clone(),
                stream: Some(stream),
            }) as Box<dyn BusSubscription>)
        })
    }

    fn service(&self, name: &str) -> BusFuture<'_, Result<Arc<dyn ServiceRequester>, BusError>> {
        let service = name.to_string();
        Box::pin(async move {
            Ok(Arc::new(TcpServiceRequester {
                service,
                config: self.config.clone(),
                conn: Mutex::new(None),
            }) as Arc<dyn ServiceRequester>)
        })
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Reconnects on the next `recv` after the publisher drops the connection,
/// so it only ever closes when the owning task stops polling it.
pub struct TcpSubscription {
    topic: String,
    config: TcpBusConfig,
    stream: Option<TcpStream>,
}

impl BusSubscription for TcpSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn recv(&mut self) -> BusFuture<'_, Option<Result<BusMessage, BusError>>> {
        Box::pin(async move {
            if self.stream.is_none() {
                tokio::time::sleep(Duration::from_millis(self.config.reconnect_interval_ms)).await;
                match open_subscription(&self.config, &self.topic).await {
                    Ok(stream) => {
                        tracing::info!(topic = %self.topic, "tcp subscriber reconnected");
                        self.stream = Some(stream);
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            let stream = self.stream.as_mut()?;
            let result = match frame::read_message(stream, self.config.max_frame_bytes).await {
                Ok(Some(message)) => Ok(message),
                Ok(None) => Err(BusError::Closed),
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                if e.breaks_connection() {
                    self.stream = None;
                }
            }
            Some(result)
        })
    }
}

// ---------------------------------------------------------------------------
// Service requester
// ---------------------------------------------------------------------------

/// One request in flight at a time over a lazily dialed connection.
///
/// The stream is taken out of the slot for the whole round trip and only put
/// back once the reply has been read, so a dropped request future drops the
/// connection along with its unread reply.
pub struct TcpServiceRequester {
    service: String,
    config: TcpBusConfig,
    conn: Mutex<Option<TcpStream>>,
}

impl ServiceRequester for TcpServiceRequester {
    fn service(&self) -> &str {
        &self.service
    }

    fn request(&self, request: BusMessage) -> BusFuture<'_, Result<BusMessage, BusError>> {
        Box::pin(async move {
            let mut conn = self.conn.lock().await;
            let mut stream = match conn.take() {
                Some(stream) => stream,
                None => dial(&self.config).await?,
            };

            let request = request.with_topic(self.service.clone());
            let result = async {
                frame::write_message(&mut stream, &request).await?;
                match frame::read_message(&mut stream, self.config.max_frame_bytes).await? {
                    Some(response) => Ok(response),
                    None => Err(BusError::Closed),
                }
            }
            .await;

            match &result {
                Err(e) if e.breaks_connection() => {}
                _ => *conn = Some(stream),
            }
            result
        })
    }
}
