//! Delivery error types

use thiserror::Error;

/// Error raised by a single delivery attempt
///
/// Every variant is terminal for the attempt that produced it. Nothing here
/// is retried or surfaced to the request that triggered the delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("Connect to {target} failed: {reason}")]
    Connect { target: String, reason: String },

    #[error("TLS handshake with {target} failed: {reason}")]
    TlsHandshake { target: String, reason: String },

    #[error("Send to {target} failed: {reason}")]
    Send { target: String, reason: String },

    #[error("Keep-alive for {target} failed: {reason}")]
    KeepAlive { target: String, reason: String },
}

impl DeliveryError {
    /// Short, stable name of the error kind (for log fields)
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::MalformedUrl { .. } => "malformed_url",
            DeliveryError::Connect { .. } => "connect",
            DeliveryError::TlsHandshake { .. } => "tls_handshake",
            DeliveryError::Send { .. } => "send",
            DeliveryError::KeepAlive { .. } => "keepalive",
        }
    }

    /// Destination the attempt was aimed at (`host:port`, or the raw URL
    /// when it could not be parsed)
    pub fn target(&self) -> &str {
        match self {
            DeliveryError::MalformedUrl { url, .. } => url,
            DeliveryError::Connect { target, .. }
            | DeliveryError::TlsHandshake { target, .. }
            | DeliveryError::Send { target, .. }
            | DeliveryError::KeepAlive { target, .. } => target,
        }
    }

    /// Whether the payload reached the socket before the error occurred
    pub fn payload_sent(&self) -> bool {
        matches!(self, DeliveryError::KeepAlive { .. })
    }
}

/// Error raised when a delivery task cannot be handed to the runtime
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Scheduler is closed")]
    Closed,
}

/// Result type alias for delivery operations
pub type Result<T> = std::result::Result<T, DeliveryError>;
