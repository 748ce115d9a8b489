//! Message bus client seam for the metadata bridge.
//!
//! The bridge only needs two primitives from a bus: subscribe-by-topic and
//! request/response-by-service-name. Both are expressed as object-safe traits
//! in [`client`]; [`tcp`] talks to a length-prefixed JSON bus over TCP and
//! [`memory`] is an in-process bus used for embedding and tests.

pub mod client;
pub mod error;
pub mod frame;
pub mod memory;
pub mod message;
pub mod tcp;

pub use client::{
    BusClient, BusConfig, BusConnector, BusFuture, BusSubscription, ServiceRequester,
    TcpBusConfig,
};
pub use error::BusError;
pub use memory::MemoryBus;
pub use message::BusMessage;
pub use tcp::{TcpBusClient, TcpConnector};
