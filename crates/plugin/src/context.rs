//! Plugin context for passing data through hooks

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Metadata visible to all plugins
#[derive(Debug, Default)]
pub struct ContextMetadata {
    /// Client IP address
    pub client_ip: Option<IpAddr>,
    /// Client socket address
    pub client_addr: Option<SocketAddr>,
    /// Request ID for tracing
    pub request_id: Option<String>,
}

/// Per-request context passed through the hook chain
///
/// Lives exactly as long as the request; plugin data stored here is never
/// shared with other requests.
pub struct PluginContext {
    /// Request start time (monotonic, for latencies)
    pub request_start: Instant,
    /// Request start time (wall clock, for log entries)
    pub started_at: DateTime<Utc>,
    /// Request metadata
    pub metadata: ContextMetadata,
    /// Host header value
    pub host: Option<String>,
    /// Request path
    pub path: String,
    /// HTTP method
    pub method: String,
    /// Selected upstream address
    pub upstream: Option<String>,
    /// Response status code (set during response phase)
    pub response_status: Option<u16>,
    /// Plugin-specific data storage (type-erased)
    data: DashMap<(TypeId, String), Box<dyn Any + Send + Sync>>,
}

impl PluginContext {
    /// Create a new plugin context
    pub fn new(method: String, path: String) -> Self {
        Self {
            request_start: Instant::now(),
            started_at: Utc::now(),
            metadata: ContextMetadata::default(),
            host: None,
            path,
            method,
            upstream: None,
            response_status: None,
            data: DashMap::new(),
        }
    }

    /// Store plugin-specific data with a key
    pub fn set<T: Any + Send + Sync + 'static>(&self, key: &str, value: T) {
        let type_id = TypeId::of::<T>();
        self.data.insert((type_id, key.to_string()), Box::new(value));
    }

    /// Retrieve plugin-specific data by key
    pub fn get<T: Any + Send + Sync + 'static>(&self, key: &str) -> Option<T>
    where
        T: Clone,
    {
        let type_id = TypeId::of::<T>();
        self.data
            .get(&(type_id, key.to_string()))
            .and_then(|v| v.downcast_ref::<T>().cloned())
    }

    /// Check if a key exists
    pub fn contains_key<T: Any + Send + Sync + 'static>(&self, key: &str) -> bool {
        let type_id = TypeId::of::<T>();
        self.data.contains_key(&(type_id, key.to_string()))
    }

    /// Remove plugin-specific data by key, handing ownership to the caller
    pub fn remove<T: Any + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let type_id = TypeId::of::<T>();
        self.data
            .remove(&(type_id, key.to_string()))
            .and_then(|(_, v)| v.downcast::<T>().ok().map(|b| *b))
    }

    /// Mutate data in place, inserting `init()` first when the key is absent
    pub fn update_or_insert<T, R>(
        &self,
        key: &str,
        init: impl FnOnce() -> T,
        update: impl FnOnce(&mut T) -> R,
    ) -> Option<R>
    where
        T: Any + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let mut entry = self
            .data
            .entry((type_id, key.to_string()))
            .or_insert_with(|| Box::new(init()));
        entry.value_mut().downcast_mut::<T>().map(update)
    }

    /// Get elapsed time since request start
    pub fn elapsed(&self) -> std::time::Duration {
        self.request_start.elapsed()
    }

    /// Set client address
    pub fn set_client_addr(&mut self, addr: SocketAddr) {
        self.metadata.client_addr = Some(addr);
        self.metadata.client_ip = Some(addr.ip());
    }

    /// Set the request ID
    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.metadata.request_id = Some(id.into());
    }

    /// Get client IP as string
    pub fn client_ip_str(&self) -> Option<String> {
        self.metadata.client_ip.map(|ip| ip.to_string())
    }
}

impl Default for PluginContext {
    fn default() -> Self {
        Self::new(String::new(), String::new())
    }
}
