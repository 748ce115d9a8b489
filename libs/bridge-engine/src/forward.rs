use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::Event;
use crate::credentials::{self, CredentialBundle};
use crate::endpoint;
use crate::probe::{ProbeCancelled, ReadinessProber};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("no endpoint configured for topic '{0}'")]
    NoEndpoint(String),

    #[error("cannot derive a dial address from '{0}'")]
    InvalidEndpoint(String),

    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Cancelled(#[from] ProbeCancelled),

    #[error("POST {url}: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },

    #[error("read response from {url}: {source}")]
    Response {
        url: String,
        source: reqwest::Error,
    },

    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Outcome of one successful POST.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: String,
    pub status: StatusCode,
    pub body: String,
    pub probe_attempts: u32,
}

/// POSTs events to the external HTTP server configured for their topic.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    endpoints: Arc<HashMap<String, String>>,
    secured: bool,
    prober: ReadinessProber,
}

impl Forwarder {
    /// Plaintext HTTP, for dev mode.
    pub fn plain(
        endpoints: HashMap<String, String>,
        prober: ReadinessProber,
        request_timeout: Duration,
    ) -> Result<Self, ForwardError> {
        credentials::install_crypto_provider();
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ForwardError::Client)?;
        Ok(Self {
            client,
            endpoints: Arc::new(endpoints),
            secured: false,
            prober,
        })
    }

    /// HTTPS with the bundle's client identity and outbound trust pool.
    pub fn secured(
        endpoints: HashMap<String, String>,
        credentials: &CredentialBundle,
        prober: ReadinessProber,
        request_timeout: Duration,
    ) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .use_preconfigured_tls(credentials.outbound_client_config())
            .timeout(request_timeout)
            .build()
            .map_err(ForwardError::Client)?;
        Ok(Self {
            client,
            endpoints: Arc::new(endpoints),
            secured: true,
            prober,
        })
    }

    /// Deliver one event: wait for the endpoint to accept connections, then
    /// POST the event as JSON to `<endpoint>/metadata`. Not retried.
    pub async fn deliver(
        &self,
        event: &Event,
        topic: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery, ForwardError> {
        let body = serde_json::to_vec(event)?;
        let endpoint = endpoint::resolve(topic, &self.endpoints, self.secured)
            .ok_or_else(|| ForwardError::NoEndpoint(topic.to_string()))?;
        let addr = endpoint::dial_address(&endpoint)
            .ok_or_else(|| ForwardError::InvalidEndpoint(endpoint.clone()))?;

        let probe_attempts = self.prober.wait_until_reachable(&addr, cancel).await?;

        let url = endpoint::post_url(&endpoint);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| ForwardError::Request {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| ForwardError::Response {
            url: url.clone(),
            source,
        })?;

        Ok(Delivery {
            url,
            status,
            body,
            probe_attempts,
        })
    }
}
