//! HTTP(S) surface of the metadata bridge: last-seen metadata and the image
//! proxy.

mod http;
mod idle;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{any, get};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use hyper_util::rt::TokioTimer;
use tokio_util::sync::CancellationToken;

use bridge_engine::config::ServerConfig;
use bridge_engine::credentials::{CredentialBundle, CredentialError};
use bridge_engine::{Bridge, ImageProxy, MetadataStore};

const MAX_HEADER_BYTES: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("load tls files: {0}")]
    TlsFiles(#[source] std::io::Error),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("serve: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetadataStore>,
    pub image: Option<Arc<ImageProxy>>,
    /// Map `/image` failures to 4xx/5xx instead of an empty 200.
    pub image_error_status: bool,
}

impl AppState {
    pub fn from_bridge(bridge: &Bridge, server: &ServerConfig) -> Self {
        Self {
            store: bridge.store().clone(),
            image: bridge.image().cloned(),
            image_error_status: server.image_error_status,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metadata", any(http::handle_metadata))
        .route("/metadata/{topic}", get(http::handle_topic_metadata))
        .route("/image", any(http::handle_image))
        .route("/health", get(http::handle_health))
        .with_state(state)
}

/// Bind `server.host:server.port` and serve until `shutdown` fires.
///
/// Plain HTTP without credentials. With credentials, HTTPS from the files
/// written at bootstrap, or from the in-memory config when client
/// certificates are required.
pub async fn run(
    server: &ServerConfig,
    state: AppState,
    credentials: Option<Arc<CredentialBundle>>,
    shutdown: CancellationToken,
) -> Result<(), ApiError> {
    let addr = format!("{}:{}", server.host, server.port);

    let Some(credentials) = credentials else {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ApiError::Bind { addr: addr.clone(), source })?;
        tracing::info!(%addr, "http server listening");
        return serve_plain(listener, state, shutdown).await;
    };

    let tls = if server.require_client_cert {
        RustlsConfig::from_config(Arc::new(credentials.inbound_server_config(true)?))
    } else {
        RustlsConfig::from_pem_file(&server.cert_path, &server.key_path)
            .await
            .map_err(ApiError::TlsFiles)?
    };

    let listener = std::net::TcpListener::bind(&addr)
        .and_then(|l| l.set_nonblocking(true).map(|()| l))
        .map_err(|source| ApiError::Bind { addr: addr.clone(), source })?;
    tracing::info!(%addr, client_auth = server.require_client_cert, "https server listening");
    serve_tls(
        listener,
        tls,
        Duration::from_secs(server.timeout_secs),
        state,
        shutdown,
    )
    .await
}

pub async fn serve_plain(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ApiError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ApiError::Serve)
}

/// HTTPS with `timeout` applied as the TLS handshake timeout, the HTTP/1
/// header read timeout and the socket idle timeout. The idle timeout bounds
/// stalled reads, stalled writes and idle keep-alive connections. Request
/// headers are capped at 1 MiB. `listener` must be non-blocking.
pub async fn serve_tls(
    listener: std::net::TcpListener,
    tls: RustlsConfig,
    timeout: Duration,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ApiError> {
    let handle = axum_server::Handle::new();
    let stopper = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        stopper.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    let acceptor = RustlsAcceptor::new(tls)
        .handshake_timeout(timeout)
        .acceptor(idle::IdleAcceptor::new(timeout));
    let mut server = axum_server::from_tcp(listener).acceptor(acceptor).handle(handle);
    server
        .http_builder()
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeout)
        .max_buf_size(MAX_HEADER_BYTES)
        .keep_alive(true);

    server
        .serve(router(state).into_make_service())
        .await
        .map_err(ApiError::Serve)
}
