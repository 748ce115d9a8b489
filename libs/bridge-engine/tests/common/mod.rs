#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair,
};
use tokio::net::TcpListener;

use bridge_engine::credentials::TlsMaterial;

/// Throwaway CA plus one leaf for `localhost` / `127.0.0.1`.
pub struct Pki {
    pub ca_pem: String,
    pub leaf_cert_pem: String,
    pub leaf_key_pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl Pki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name = name("Bridge Test CA");
        let ca = params.self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(params, ca_key);

        let (leaf_cert_pem, leaf_key_pem) = issue(&issuer, "Bridge Test Leaf");
        Self {
            ca_pem: ca.pem(),
            leaf_cert_pem,
            leaf_key_pem,
            issuer,
        }
    }

    /// Another leaf from the same CA.
    pub fn issue(&self, common_name: &str) -> (String, String) {
        issue(&self.issuer, common_name)
    }

    /// Bridge identity from this CA, trusting this CA both ways.
    pub fn material(&self) -> TlsMaterial {
        TlsMaterial {
            server_cert: self.leaf_cert_pem.clone().into_bytes(),
            server_key: self.leaf_key_pem.clone().into_bytes(),
            ca_cert: self.ca_pem.clone().into_bytes(),
            http_server_ca: self.ca_pem.clone().into_bytes(),
        }
    }
}

fn issue(issuer: &Issuer<'_, KeyPair>, common_name: &str) -> (String, String) {
    let key = KeyPair::generate().unwrap();
    let mut params =
        CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
    params.distinguished_name = name(common_name);
    params.is_ca = IsCa::NoCa;
    let cert = params.signed_by(&key, issuer).unwrap();
    (cert.pem(), key.serialize_pem())
}

fn name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

/// One POST received by [`MetadataSink`].
#[derive(Debug, Clone)]
pub struct Received {
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

/// External HTTP server stand-in answering `POST /metadata`.
#[derive(Clone, Default)]
pub struct MetadataSink {
    pub received: Arc<Mutex<Vec<Received>>>,
}

impl MetadataSink {
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metadata", post(record))
            .with_state(self.clone())
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub async fn serve_plain(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.router();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    pub async fn serve_tls(&self, cert_pem: &str, key_pem: &str) -> SocketAddr {
        bridge_engine::credentials::install_crypto_provider();
        let config = axum_server::tls_rustls::RustlsConfig::from_pem(
            cert_pem.as_bytes().to_vec(),
            key_pem.as_bytes().to_vec(),
        )
        .await
        .unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.router();
        tokio::spawn(async move {
            let _ = axum_server::from_tcp_rustls(listener, config)
                .serve(app.into_make_service())
                .await;
        });
        addr
    }
}

async fn record(State(sink): State<MetadataSink>, headers: HeaderMap, body: Bytes) -> &'static str {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    sink.received.lock().unwrap().push(Received { content_type, body });
    "accepted"
}
