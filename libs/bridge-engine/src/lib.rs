//! Bus-to-HTTP metadata bridge engine.
//!
//! Subscribes to bus topics, keeps the last-seen metadata, optionally POSTs
//! every event to a per-topic HTTP endpoint, and proxies image reads to the
//! image store service.

pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod forward;
pub mod image;
pub mod probe;
pub mod store;
pub mod subscription;

/// One metadata event: a JSON object tagged with its `topic`.
pub type Event = serde_json::Map<String, serde_json::Value>;

pub use bootstrap::Bridge;
pub use config::BridgeConfig;
pub use error::EngineError;
pub use image::{ImageError, ImageProxy};
pub use store::MetadataStore;
