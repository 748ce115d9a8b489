//! TLS credentials built once at startup from raw PEM buffers.
//!
//! The server certificate doubles as the client identity for outbound
//! deliveries. Two independent trust pools are kept: one for the external
//! HTTP servers metadata is posted to, one for peers connecting to the
//! bridge's own HTTPS listener.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

/// Raw PEM buffers handed over by the configuration source.
#[derive(Clone, Default)]
pub struct TlsMaterial {
    pub server_cert: Vec<u8>,
    pub server_key: Vec<u8>,
    pub ca_cert: Vec<u8>,
    pub http_server_ca: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("server_cert", &self.server_cert.len())
            .field("server_key", &"<redacted>")
            .field("ca_cert", &self.ca_cert.len())
            .field("http_server_ca", &self.http_server_ca.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("server certificate: {0}")]
    Certificate(String),

    #[error("server key: {0}")]
    Key(String),

    #[error("certificate/key pair: {0}")]
    KeyPair(#[source] rustls::Error),

    #[error("tls config: {0}")]
    Tls(#[from] rustls::Error),

    #[error("client certificate verifier: {0}")]
    Verifier(#[from] VerifierBuilderError),

    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Install aws-lc-rs as the process-wide rustls provider. Later calls are
/// no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

pub struct CredentialBundle {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    inbound_roots: Arc<RootCertStore>,
    outbound_roots: Arc<RootCertStore>,
    client_config: Arc<ClientConfig>,
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("cert_chain", &self.cert_chain.len())
            .field("inbound_roots", &self.inbound_roots.len())
            .field("outbound_roots", &self.outbound_roots.len())
            .finish()
    }
}

impl CredentialBundle {
    /// Parse and cross-check the material.
    ///
    /// A bad certificate or key, or a key that does not belong to the
    /// certificate, is an error. Unparsable trust anchors are skipped, which
    /// may leave a pool empty; handshakes against it then fail.
    pub fn build(material: &TlsMaterial) -> Result<Self, CredentialError> {
        let cert_chain = CertificateDer::pem_slice_iter(&material.server_cert)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CredentialError::Certificate(e.to_string()))?;
        if cert_chain.is_empty() {
            return Err(CredentialError::Certificate("no PEM certificate found".to_string()));
        }
        let key = PrivateKeyDer::from_pem_slice(&material.server_key)
            .map_err(|e| CredentialError::Key(e.to_string()))?;

        let inbound_roots = Arc::new(trust_pool("ca_cert", &material.ca_cert));
        let outbound_roots = Arc::new(trust_pool("http_server_ca", &material.http_server_ca));

        let client_config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(outbound_roots.clone())
            .with_client_auth_cert(cert_chain.clone(), key.clone_key())
            .map_err(CredentialError::KeyPair)?;

        Ok(Self {
            cert_chain,
            key,
            cert_pem: material.server_cert.clone(),
            key_pem: material.server_key.clone(),
            inbound_roots,
            outbound_roots,
            client_config: Arc::new(client_config),
        })
    }

    /// Client config trusting only the outbound pool and presenting the
    /// server certificate as client identity.
    pub fn outbound_client_config(&self) -> ClientConfig {
        (*self.client_config).clone()
    }

    /// Server config for the HTTPS listener. With `require_client_cert`,
    /// peers must present a certificate issued by the inbound pool.
    pub fn inbound_server_config(&self, require_client_cert: bool) -> Result<ServerConfig, CredentialError> {
        let builder = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?;
        let builder = if require_client_cert {
            let verifier =
                WebPkiClientVerifier::builder_with_provider(self.inbound_roots.clone(), provider())
                    .build()?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };
        let mut config = builder.with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(config)
    }

    pub fn inbound_trust_anchors(&self) -> usize {
        self.inbound_roots.len()
    }

    pub fn outbound_trust_anchors(&self) -> usize {
        self.outbound_roots.len()
    }

    /// Write the plaintext certificate and key for the HTTPS listener,
    /// owner-read-only. Stale files are replaced.
    pub fn write_server_files(&self, cert_path: &Path, key_path: &Path) -> Result<(), CredentialError> {
        write_secret(cert_path, &self.cert_pem)?;
        write_secret(key_path, &self.key_pem)?;
        tracing::info!(cert = %cert_path.display(), key = %key_path.display(), "wrote server certificate files");
        Ok(())
    }
}

fn trust_pool(name: &str, pem: &[u8]) -> RootCertStore {
    let certs: Vec<CertificateDer<'static>> =
        CertificateDer::pem_slice_iter(pem).filter_map(Result::ok).collect();
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 || ignored > 0 {
        tracing::warn!(pool = name, added, ignored, "trust pool is incomplete");
    }
    roots
}

fn write_secret(path: &Path, contents: &[u8]) -> Result<(), CredentialError> {
    let err = |source| CredentialError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(err)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(err(e)),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o400);
    }
    let mut file = options.open(path).map_err(err)?;
    file.write_all(contents).map_err(err)?;
    Ok(())
}
