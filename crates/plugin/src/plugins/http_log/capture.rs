//! Request/response body capture
//!
//! One [`CapturedExchange`] is kept per request in the [`PluginContext`]. The
//! request body is captured once; response chunks are appended in the order
//! the body hook sees them. The logging hook takes the exchange out of the
//! context, after which nothing can append to it.

use crate::context::PluginContext;
use bytes::{Bytes, BytesMut};

/// Context key the exchange is stored under
pub const EXCHANGE_KEY: &str = "http_log.exchange";

/// Bodies captured for one request
#[derive(Debug, Clone, Default)]
pub struct CapturedExchange {
    request_body: Option<Bytes>,
    response_body: Option<BytesMut>,
    request_truncated: bool,
    response_truncated: bool,
    limit: Option<usize>,
}

impl CapturedExchange {
    /// Empty exchange; `limit` caps each body (`None` = unbounded)
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Capture the buffered request body
    ///
    /// Only the first call has an effect, so re-reading yields the same bytes.
    pub fn capture_request(&mut self, body: &Bytes) {
        if self.request_body.is_some() {
            return;
        }
        let captured = match self.limit {
            Some(limit) if body.len() > limit => {
                self.request_truncated = true;
                body.slice(..limit)
            }
            _ => body.clone(),
        };
        self.request_body = Some(captured);
    }

    /// Append one response chunk
    pub fn append_response(&mut self, chunk: &[u8]) {
        let buf = self.response_body.get_or_insert_with(BytesMut::new);
        let room = match self.limit {
            Some(limit) => limit.saturating_sub(buf.len()),
            None => chunk.len(),
        };
        if chunk.len() > room {
            self.response_truncated = true;
        }
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn request_body(&self) -> Option<&[u8]> {
        self.request_body.as_deref()
    }

    pub fn response_body(&self) -> Option<&[u8]> {
        self.response_body.as_deref()
    }

    pub fn request_truncated(&self) -> bool {
        self.request_truncated
    }

    pub fn response_truncated(&self) -> bool {
        self.response_truncated
    }
}

/// Capture the request body into the request's exchange
pub fn capture_request_body(ctx: &PluginContext, body: &Bytes, limit: Option<usize>) {
    ctx.update_or_insert(
        EXCHANGE_KEY,
        || CapturedExchange::new(limit),
        |exchange| exchange.capture_request(body),
    );
}

/// Append a response chunk to the request's exchange
pub fn capture_response_chunk(ctx: &PluginContext, chunk: &[u8], limit: Option<usize>) {
    ctx.update_or_insert(
        EXCHANGE_KEY,
        || CapturedExchange::new(limit),
        |exchange| exchange.append_response(chunk),
    );
}

/// Move the exchange out of the context (empty if nothing was captured)
pub fn take_exchange(ctx: &PluginContext) -> CapturedExchange {
    ctx.remove::<CapturedExchange>(EXCHANGE_KEY)
        .unwrap_or_default()
}
