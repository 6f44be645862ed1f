//! Raw HTTP/1.1 request construction
//!
//! Log payloads are sent as a single hand-built request message. The body is
//! written verbatim; the builder never re-encodes or limits it.

use crate::endpoint::ParsedEndpoint;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};

/// A complete, immutable HTTP/1.1 request message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    bytes: Bytes,
    head_len: usize,
}

impl RawMessage {
    /// Full message bytes (head + body)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Header block including the terminating blank line
    pub fn head(&self) -> &[u8] {
        &self.bytes[..self.head_len]
    }

    /// Message body
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.head_len..]
    }

    /// Total message length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Build the request message for one delivery
///
/// Header order is fixed: `Host`, `Connection`, `Content-Type`,
/// `Content-Length`, then `Authorization` when the endpoint carries userinfo.
pub fn build(method: &str, endpoint: &ParsedEndpoint, body: &[u8]) -> RawMessage {
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: Keep-Alive\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
        method,
        endpoint.request_target(),
        endpoint.host_header(),
        body.len()
    );

    if let Some(userinfo) = &endpoint.userinfo {
        head.push_str("Authorization: Basic ");
        head.push_str(&STANDARD.encode(userinfo.as_bytes()));
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.extend_from_slice(head.as_bytes());
    buf.extend_from_slice(body);

    RawMessage {
        head_len: head.len(),
        bytes: buf.freeze(),
    }
}
