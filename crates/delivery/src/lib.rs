//! delivery: Fire-and-forget log delivery for relaylog
//!
//! This crate ships serialized log payloads to a remote HTTP collector
//! without touching the request path that produced them:
//! - Endpoint URL resolution with scheme-default ports
//! - Hand-built HTTP/1.1 request messages (no HTTP client library)
//! - Plain TCP and TLS connections with per-operation timeouts
//! - A keep-alive pool of idle connections keyed by destination
//! - A deferred scheduler that runs each delivery as a detached task

pub mod client;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod pool;
pub mod scheduler;
pub mod tls;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::DeliveryClient;
pub use connection::Connection;
pub use endpoint::{default_port, resolve, ParsedEndpoint};
pub use error::{DeliveryError, Result, ScheduleError};
pub use message::{build, RawMessage};
pub use pool::{ConnectionPool, PoolKey};
pub use scheduler::{DeferredScheduler, DeliveryStats, DeliveryTask};
