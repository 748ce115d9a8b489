use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use bridge_bus::BusConfig;
use serde::Deserialize;

use crate::credentials::TlsMaterial;
use crate::error::EngineError;

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Unsecured mode: plaintext outbound and inbound HTTP, no TLS material.
    #[serde(default)]
    pub dev_mode: bool,

    #[serde(default)]
    pub server: ServerConfig,

    /// TLS material. Required unless `dev_mode`.
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Topic name → base URL of the external HTTP server receiving that
    /// topic's metadata.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,

    #[serde(default)]
    pub subscribers: Vec<SubscriberConfig>,

    #[serde(default)]
    pub image_store: Option<ImageStoreConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where the server certificate is written for the HTTPS listener.
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
    /// Verify inbound client certificates against `tls.ca_cert`.
    #[serde(default)]
    pub require_client_cert: bool,
    /// Map `/image` failures to 4xx/5xx instead of an empty 200.
    #[serde(default)]
    pub image_error_status: bool,
    /// TLS handshake and header read timeout (secured mode only).
    #[serde(default = "default_server_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
            require_client_cert: false,
            image_error_status: false,
            timeout_secs: default_server_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8087
}
fn default_cert_path() -> PathBuf {
    PathBuf::from("/run/metadata-bridge/server_cert.pem")
}
fn default_key_path() -> PathBuf {
    PathBuf::from("/run/metadata-bridge/server_key.pem")
}
fn default_server_timeout_secs() -> u64 {
    60
}

/// PEM material, inline or read from a file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PemSource {
    Inline(String),
    File { file: PathBuf },
}

impl PemSource {
    pub fn read(&self) -> Result<Vec<u8>, EngineError> {
        match self {
            PemSource::Inline(pem) => Ok(pem.as_bytes().to_vec()),
            PemSource::File { file } => std::fs::read(file)
                .map_err(|e| EngineError::Config(format!("{}: {e}", file.display()))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Certificate presented by the HTTPS server and as outbound client identity.
    pub server_cert: PemSource,
    pub server_key: PemSource,
    /// Trust anchors for inbound peers.
    pub ca_cert: PemSource,
    /// Trust anchors for the external HTTP servers metadata is posted to.
    pub http_server_ca: PemSource,
}

impl TlsConfig {
    pub fn load_material(&self) -> Result<TlsMaterial, EngineError> {
        Ok(TlsMaterial {
            server_cert: self.server_cert.read().map_err(|e| e.with_context("tls.server_cert"))?,
            server_key: self.server_key.read().map_err(|e| e.with_context("tls.server_key"))?,
            ca_cert: self.ca_cert.read().map_err(|e| e.with_context("tls.ca_cert"))?,
            http_server_ca: self
                .http_server_ca
                .read()
                .map_err(|e| e.with_context("tls.http_server_ca"))?,
        })
    }
}

/// Strategy when a topic's delivery queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the newest event and log it.
    Drop,
    /// Stall the subscription until the delivery worker catches up.
    #[serde(alias = "backpressure")]
    BackPressure,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// POST every received event to the topic's endpoint.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_delivery_buffer")]
    pub buffer: usize,
    #[serde(default = "default_delivery_overflow")]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_probe_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer: default_delivery_buffer(),
            overflow: default_delivery_overflow(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_interval_ms: default_probe_ms(),
            probe_timeout_ms: default_probe_ms(),
        }
    }
}

fn default_delivery_buffer() -> usize {
    64
}
fn default_delivery_overflow() -> OverflowPolicy {
    OverflowPolicy::Drop
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_probe_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberConfig {
    pub topics: Vec<String>,
    pub bus: BusConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageStoreConfig {
    /// Bus service name answering `read` requests.
    #[serde(default = "default_image_service")]
    pub service: String,
    pub bus: BusConfig,
    /// Unset waits for the response indefinitely.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_image_service() -> String {
    "ImageStore".to_string()
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn secured(&self) -> bool {
        !self.dev_mode
    }

    /// Every subscribed topic, in declaration order.
    pub fn topics(&self) -> impl Iterator<Item = (&str, &BusConfig)> {
        self.subscribers
            .iter()
            .flat_map(|sub| sub.topics.iter().map(move |t| (t.as_str(), &sub.bus)))
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.secured() && self.tls.is_none() {
            return Err(EngineError::Config(
                "[tls] is required when dev_mode = false".to_string(),
            ));
        }
        if self.server.require_client_cert && !self.secured() {
            return Err(EngineError::Config(
                "server.require_client_cert needs dev_mode = false".to_string(),
            ));
        }
        if self.delivery.buffer == 0 {
            return Err(EngineError::Config("delivery.buffer must be > 0".to_string()));
        }

        let mut seen = HashSet::new();
        for (i, sub) in self.subscribers.iter().enumerate() {
            if sub.topics.is_empty() {
                return Err(EngineError::Config(format!("subscribers[{i}]: no topics")));
            }
            for topic in &sub.topics {
                if !seen.insert(topic.as_str()) {
                    return Err(EngineError::Config(format!(
                        "topic '{topic}' is subscribed more than once"
                    )));
                }
                if self.delivery.enabled && !self.endpoints.contains_key(topic) {
                    return Err(EngineError::Config(format!(
                        "topic '{topic}' has no entry in [endpoints]"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: &str = r#"
        dev_mode = true

        [delivery]
        enabled = true

        [endpoints]
        camera1_stream_results = "http://localhost:8082"

        [[subscribers]]
        topics = ["camera1_stream_results"]
        bus = { type = "tcp", host = "ia_video_analytics", port = 65013 }

        [image_store]
        bus = { type = "tcp", host = "ia_imagestore", port = 5669 }
    "#;

    #[test]
    fn parses_with_defaults() {
        let cfg = BridgeConfig::parse(DEV).unwrap();
        cfg.validate().unwrap();
        assert!(!cfg.secured());
        assert_eq!(cfg.server.port, 8087);
        assert_eq!(cfg.delivery.buffer, 64);
        assert_eq!(cfg.delivery.overflow, OverflowPolicy::Drop);
        assert_eq!(cfg.image_store.as_ref().unwrap().service, "ImageStore");
        assert_eq!(cfg.image_store.as_ref().unwrap().request_timeout_ms, None);
        let topics: Vec<_> = cfg.topics().map(|(t, _)| t).collect();
        assert_eq!(topics, ["camera1_stream_results"]);
    }

    #[test]
    fn secured_mode_requires_tls() {
        let cfg = BridgeConfig::parse(&DEV.replace("dev_mode = true", "dev_mode = false")).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("[tls]"), "{err}");
    }

    #[test]
    fn forwarding_needs_an_endpoint_per_topic() {
        let cfg = BridgeConfig::parse(&DEV.replace("camera1_stream_results = ", "other = ")).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("camera1_stream_results"), "{err}");
    }

    #[test]
    fn rejects_duplicate_topics_and_empty_buffer() {
        let dup = format!(
            "{DEV}\n[[subscribers]]\ntopics = [\"camera1_stream_results\"]\nbus = {{ type = \"tcp\", host = \"h\", port = 1 }}\n"
        );
        assert!(BridgeConfig::parse(&dup).unwrap().validate().is_err());

        let zero = DEV.replace("enabled = true", "enabled = true\nbuffer = 0");
        assert!(BridgeConfig::parse(&zero).unwrap().validate().is_err());
    }

    #[test]
    fn pem_sources_accept_inline_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "FROM FILE").unwrap();

        let toml_str = format!(
            r#"
            server_cert = "INLINE"
            server_key = "KEY"
            ca_cert = {{ file = "{}" }}
            http_server_ca = {{ file = "/does/not/exist.pem" }}
            "#,
            path.display()
        );
        let tls: TlsConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(tls.server_cert.read().unwrap(), b"INLINE");
        assert_eq!(tls.ca_cert.read().unwrap(), b"FROM FILE");
        let err = tls.load_material().unwrap_err().to_string();
        assert!(err.contains("tls.http_server_ca"), "{err}");
    }
}
