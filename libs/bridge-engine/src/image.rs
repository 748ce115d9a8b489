use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use bridge_bus::{BusConnector, BusError, BusMessage, ServiceRequester};

use crate::config::ImageStoreConfig;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image store is not configured")]
    Unavailable,

    #[error("send read request: {0}")]
    Request(#[source] BusError),

    #[error("receive read response: {0}")]
    Response(#[source] BusError),

    #[error("image store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("image '{0}' not found")]
    NotFound(String),
}

/// Fetches image blobs from the image store service by handle. Nothing is
/// cached.
pub struct ImageProxy {
    requester: Arc<dyn ServiceRequester>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ImageProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProxy")
            .field("service", &self.requester.service())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ImageProxy {
    pub fn new(requester: Arc<dyn ServiceRequester>, timeout: Option<Duration>) -> Self {
        Self { requester, timeout }
    }

    /// Connect to the configured image store service.
    pub async fn connect(
        connector: &dyn BusConnector,
        config: &ImageStoreConfig,
    ) -> Result<Self, BusError> {
        let client = connector.connect(&config.bus).await?;
        let requester = client.service(&config.service).await?;
        tracing::info!(service = %config.service, bus = %config.bus, "connected to image store");
        Ok(Self::new(
            requester,
            config.request_timeout_ms.map(Duration::from_millis),
        ))
    }

    pub async fn fetch(&self, handle: &str) -> Result<Vec<u8>, ImageError> {
        let mut data = Map::new();
        data.insert("command".to_string(), Value::String("read".to_string()));
        data.insert("img_handle".to_string(), Value::String(handle.to_string()));

        let request = self.requester.request(BusMessage::new(data));
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| ImageError::Timeout(limit))?,
            None => request.await,
        };

        let mut response = result.map_err(|e| match e {
            BusError::Connect { .. } | BusError::Envelope(_) | BusError::ServiceNotFound(_) => {
                ImageError::Request(e)
            }
            other => ImageError::Response(other),
        })?;

        if let Some(error) = response.data.get("error") {
            tracing::warn!(img_handle = handle, error = %error, "image store returned an error");
            return Err(ImageError::NotFound(handle.to_string()));
        }
        if response.blobs.is_empty() {
            return Err(ImageError::NotFound(handle.to_string()));
        }
        Ok(response.blobs.swap_remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_bus::{BusClient, MemoryBus};

    async fn proxy(bus: &MemoryBus, timeout: Option<Duration>) -> ImageProxy {
        ImageProxy::new(bus.service("ImageStore").await.unwrap(), timeout)
    }

    #[tokio::test]
    async fn returns_first_blob_for_handle() {
        let bus = MemoryBus::default();
        bus.register_service("ImageStore", |req: BusMessage| async move {
            assert_eq!(req.data["command"], "read");
            let handle = req.data["img_handle"].as_str().unwrap_or_default().to_string();
            Ok(BusMessage::default()
                .with_blob(handle.into_bytes())
                .with_blob(b"ignored".to_vec()))
        });

        let bytes = proxy(&bus, None).await.fetch("a1b2").await.unwrap();
        assert_eq!(bytes, b"a1b2");
    }

    #[tokio::test]
    async fn missing_blob_or_error_field_is_not_found() {
        let bus = MemoryBus::default();
        bus.register_service("ImageStore", |req: BusMessage| async move {
            let mut resp = BusMessage::default();
            if req.data["img_handle"] == "err" {
                resp.data.insert("error".into(), Value::String("no such handle".into()));
                resp = resp.with_blob(vec![1]);
            }
            Ok(resp)
        });

        let proxy = proxy(&bus, None).await;
        assert!(matches!(proxy.fetch("empty").await, Err(ImageError::NotFound(h)) if h == "empty"));
        assert!(matches!(proxy.fetch("err").await, Err(ImageError::NotFound(_))));
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let bus = MemoryBus::default();
        bus.register_service("ImageStore", |_req: BusMessage| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(BusMessage::default())
        });

        let limit = Duration::from_millis(30);
        let err = proxy(&bus, Some(limit)).await.fetch("x").await.unwrap_err();
        assert!(matches!(err, ImageError::Timeout(d) if d == limit));
    }

    #[tokio::test]
    async fn transport_failure_is_a_response_error() {
        let bus = MemoryBus::default();
        bus.register_service("ImageStore", |_req: BusMessage| async move { Err(BusError::Closed) });
        let err = proxy(&bus, None).await.fetch("x").await.unwrap_err();
        assert!(matches!(err, ImageError::Response(BusError::Closed)));
    }
}
