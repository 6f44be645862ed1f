//! Delivery client: connect, send, and pool collector connections
//!
//! Each call to [`DeliveryClient::deliver`] is one best-effort attempt:
//! 1. Reuse an idle pooled connection for the destination, or dial a new one
//! 2. Wrap it in TLS for `https` endpoints (handshake failure aborts)
//! 3. Write the whole message under the configured timeout
//! 4. Hand the connection back to the keep-alive pool
//!
//! A connection that saw any error is dropped, never pooled.

use crate::connection::Connection;
use crate::endpoint::ParsedEndpoint;
use crate::error::{DeliveryError, Result};
use crate::message::RawMessage;
use crate::pool::{ConnectionPool, PoolKey, DEFAULT_MAX_IDLE_PER_KEY};
use crate::tls;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Sends raw messages to collectors over pooled TCP/TLS connections
pub struct DeliveryClient {
    pool: ConnectionPool<Connection>,
    tls: TlsConnector,
}

impl DeliveryClient {
    /// Create a client; `tls_verify` controls collector certificate checks
    pub fn new(tls_verify: bool) -> std::result::Result<Self, rustls::Error> {
        Ok(Self::with_tls_config(tls::client_config(tls_verify)?))
    }

    /// Create a client with an explicit TLS client configuration
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self {
            pool: ConnectionPool::new(DEFAULT_MAX_IDLE_PER_KEY),
            tls: TlsConnector::from(config),
        }
    }

    /// Replace the keep-alive pool (e.g. to change the per-destination limit)
    pub fn with_pool(mut self, pool: ConnectionPool<Connection>) -> Self {
        self.pool = pool;
        self
    }

    /// The keep-alive pool
    pub fn pool(&self) -> &ConnectionPool<Connection> {
        &self.pool
    }

    /// Deliver one message
    ///
    /// `io_timeout` bounds each of connect, TLS handshake and write;
    /// `keepalive` is how long the connection may idle in the pool afterwards
    /// (zero closes it instead).
    pub async fn deliver(
        &self,
        endpoint: &ParsedEndpoint,
        message: &RawMessage,
        io_timeout: Duration,
        keepalive: Duration,
    ) -> Result<()> {
        let port = endpoint.port.ok_or_else(|| DeliveryError::Connect {
            target: endpoint.target(),
            reason: format!("no port given and no default for scheme '{}'", endpoint.scheme),
        })?;
        let key = PoolKey::new(endpoint.scheme.as_str(), endpoint.host.as_str(), port);
        let target = key.to_string();

        let mut conn = match self.take_idle(&key) {
            Some(conn) => {
                debug!(target = %target, "Reusing pooled connection");
                conn
            }
            None => self.connect(endpoint, port, &target, io_timeout).await?,
        };

        match timeout(io_timeout, conn.send(message.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(DeliveryError::Send {
                    target,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(DeliveryError::Send {
                    target,
                    reason: format!("write timed out after {:?}", io_timeout),
                })
            }
        }
        trace!(target = %target, bytes = message.len(), "Message written");

        if keepalive.is_zero() {
            let _ = timeout(io_timeout, conn.shutdown()).await;
            return Ok(());
        }

        self.pool.release(key, conn, keepalive).map_err(|_conn| DeliveryError::KeepAlive {
            target,
            reason: format!(
                "idle pool full ({} connections)",
                self.pool.max_idle_per_key()
            ),
        })
    }

    fn take_idle(&self, key: &PoolKey) -> Option<Connection> {
        while let Some(mut conn) = self.pool.acquire(key) {
            if conn.is_reusable() {
                return Some(conn);
            }
            debug!(target = %key, "Discarding pooled connection closed by peer");
        }
        None
    }

    async fn connect(
        &self,
        endpoint: &ParsedEndpoint,
        port: u16,
        target: &str,
        io_timeout: Duration,
    ) -> Result<Connection> {
        let stream = match timeout(io_timeout, TcpStream::connect((endpoint.connect_host(), port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(DeliveryError::Connect {
                    target: target.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(DeliveryError::Connect {
                    target: target.to_string(),
                    reason: format!("timed out after {:?}", io_timeout),
                })
            }
        };
        let _ = stream.set_nodelay(true);
        debug!(target = %target, tls = endpoint.is_tls(), "Opened collector connection");

        if !endpoint.is_tls() {
            return Ok(Connection::Plain(stream));
        }

        let name = tls::server_name(endpoint.connect_host()).map_err(|reason| {
            DeliveryError::TlsHandshake {
                target: target.to_string(),
                reason,
            }
        })?;

        match timeout(io_timeout, self.tls.connect(name, stream)).await {
            Ok(Ok(stream)) => Ok(Connection::Tls(Box::new(stream))),
            Ok(Err(e)) => Err(DeliveryError::TlsHandshake {
                target: target.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(DeliveryError::TlsHandshake {
                target: target.to_string(),
                reason: format!("timed out after {:?}", io_timeout),
            }),
        }
    }
}

impl std::fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("pool", &self.pool)
            .finish()
    }
}
