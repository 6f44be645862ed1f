//! Local collector used by the delivery tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

/// How a [`Collector`] treats each connection
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// Write a `204 No Content` response after every request
    pub reply: bool,
    /// Close the connection after the first request
    pub close_after_first: bool,
}

/// A collector listening on 127.0.0.1 that records every request it reads
pub struct Collector {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    requests: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Collector {
    /// Plain TCP collector
    pub async fn start() -> Self {
        Self::spawn(None, Behavior::default()).await
    }

    /// TLS collector terminating with `acceptor`
    pub async fn start_tls(acceptor: TlsAcceptor) -> Self {
        Self::spawn(Some(acceptor), Behavior::default()).await
    }

    /// Collector with non-default connection handling (TLS when `acceptor` is set)
    pub async fn with_behavior(acceptor: Option<TlsAcceptor>, behavior: Behavior) -> Self {
        Self::spawn(acceptor, behavior).await
    }

    async fn spawn(acceptor: Option<TlsAcceptor>, behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, requests) = mpsc::unbounded_channel();

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => {
                            if let Ok(stream) = acceptor.accept(socket).await {
                                read_requests(stream, tx, behavior).await;
                            }
                        }
                        None => read_requests(socket, tx, behavior).await,
                    }
                });
            }
        });

        Self {
            addr,
            accepted,
            requests,
        }
    }

    /// Number of TCP connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Next complete request (head + body)
    pub async fn next_request(&mut self) -> Vec<u8> {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.requests.recv())
            .await
            .expect("collector timed out waiting for a request")
            .expect("collector stopped")
    }

    /// Whether a request arrives within `wait`
    pub async fn receives_within(&mut self, wait: std::time::Duration) -> bool {
        matches!(
            tokio::time::timeout(wait, self.requests.recv()).await,
            Ok(Some(_))
        )
    }
}

async fn read_requests<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    behavior: Behavior,
) {
    let mut reader = BufReader::new(stream);
    while let Some(request) = read_request(&mut reader).await {
        if tx.send(request).is_err() {
            return;
        }
        if behavior.reply {
            let stream = reader.get_mut();
            if stream.write_all(b"HTTP/1.1 204 No Content\r\n\r\n").await.is_err() {
                return;
            }
            let _ = stream.flush().await;
        }
        if behavior.close_after_first {
            return;
        }
    }
}

async fn read_request<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) -> Option<Vec<u8>> {
    let mut head = Vec::new();
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await.ok()? == 0 {
            return None;
        }
        head.extend_from_slice(&line);
        if line == b"\r\n" {
            break;
        }
    }

    let content_length = String::from_utf8_lossy(&head)
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: ").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.ok()?;
    head.extend_from_slice(&body);
    Some(head)
}

/// Acceptor serving a `localhost` certificate issued by a throwaway CA
///
/// Returns the CA certificate so tests can trust it explicitly.
pub fn self_signed_acceptor() -> (TlsAcceptor, rustls::pki_types::CertificateDer<'static>) {
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "relaylog test ca");
    let ca_key = KeyPair::generate().unwrap();
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, "localhost");
    let leaf_key = KeyPair::generate().unwrap();
    let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![leaf_cert.der().clone()], key)
    .unwrap();

    (TlsAcceptor::from(Arc::new(config)), ca_cert.der().clone())
}
