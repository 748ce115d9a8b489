#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair,
};
use tokio_util::sync::CancellationToken;

use bridge_api_server::AppState;
use bridge_engine::MetadataStore;
use bridge_engine::credentials::TlsMaterial;

pub struct Pki {
    pub ca_pem: String,
    pub leaf_cert_pem: String,
    pub leaf_key_pem: String,
}

impl Pki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name = name("Bridge Test CA");
        let ca = params.self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(params, ca_key);

        let key = KeyPair::generate().unwrap();
        let mut params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
        params.distinguished_name = name("Bridge Test Leaf");
        params.is_ca = IsCa::NoCa;
        let leaf = params.signed_by(&key, &issuer).unwrap();

        Self {
            ca_pem: ca.pem(),
            leaf_cert_pem: leaf.pem(),
            leaf_key_pem: key.serialize_pem(),
        }
    }

    pub fn material(&self) -> TlsMaterial {
        TlsMaterial {
            server_cert: self.leaf_cert_pem.clone().into_bytes(),
            server_key: self.leaf_key_pem.clone().into_bytes(),
            ca_cert: self.ca_pem.clone().into_bytes(),
            http_server_ca: self.ca_pem.clone().into_bytes(),
        }
    }
}

fn name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

pub fn state(store: Arc<MetadataStore>) -> AppState {
    AppState {
        store,
        image: None,
        image_error_status: false,
    }
}

/// Serve plain HTTP on an ephemeral port.
pub async fn spawn_plain(state: AppState) -> (SocketAddr, CancellationToken) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        bridge_api_server::serve_plain(listener, state, shutdown).await.unwrap();
    });
    (addr, token)
}
