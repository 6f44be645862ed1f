//! Collector connection (plain TCP or TLS over TCP)

use futures::FutureExt;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// An open connection to a collector
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    /// Write the whole buffer and flush it
    pub async fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Connection::Plain(stream) => {
                stream.write_all(buf).await?;
                stream.flush().await
            }
            Connection::Tls(stream) => {
                stream.write_all(buf).await?;
                stream.flush().await
            }
        }
    }

    /// Check an idle connection before reuse
    ///
    /// Discards whatever the collector wrote back since the last delivery
    /// (responses are never read) and reports `false` once the peer has
    /// closed its side. TLS connections are read through the session without
    /// waiting, so a `close_notify` or a bare FIN both show up here.
    pub fn is_reusable(&mut self) -> bool {
        let mut scratch = [0u8; 1024];
        match self {
            Connection::Plain(stream) => loop {
                match stream.try_read(&mut scratch) {
                    Ok(0) => return false,
                    Ok(_) => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                    Err(_) => return false,
                }
            },
            Connection::Tls(stream) => loop {
                match stream.read(&mut scratch).now_or_never() {
                    None => return true,
                    Some(Ok(0)) => return false,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return false,
                }
            },
        }
    }

    /// Close the write side, letting the collector see a clean EOF
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(stream) => stream.shutdown().await,
            Connection::Tls(stream) => stream.shutdown().await,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Connection::Tls(_))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let peer = match self {
            Connection::Plain(stream) => stream.peer_addr().ok(),
            Connection::Tls(stream) => stream.get_ref().0.peer_addr().ok(),
        };
        f.debug_struct("Connection")
            .field("tls", &self.is_tls())
            .field("peer", &peer)
            .finish()
    }
}
