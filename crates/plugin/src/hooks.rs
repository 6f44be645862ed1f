//! Hook traits for the plugin pipeline
//!
//! These hooks correspond to the request filter, response body and logging
//! stages of a proxy pipeline.

use crate::context::PluginContext;
use crate::error::Result;
use crate::priority::HookPriority;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Hook execution result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookAction {
    /// Continue to next hook/processing
    #[default]
    Continue,
    /// Skip remaining hooks in this phase, continue pipeline
    SkipPhase,
    /// Short-circuit entire request (response already handled)
    ShortCircuit,
}

/// HTTP request as seen by plugins
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub host: Option<String>,
    pub headers: HashMap<String, String>,
    pub query: Option<String>,
    /// Buffered request body, when the host has read it
    pub body: Option<Bytes>,
}

/// HTTP response info
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
        }
    }
}

/// Request filter (after parsing, before routing)
#[async_trait]
pub trait RequestFilterHook: Send + Sync {
    fn priority(&self) -> HookPriority {
        HookPriority::NORMAL
    }

    /// Called once per request after parsing
    async fn on_request(
        &self,
        request: &RequestInfo,
        ctx: &mut PluginContext,
    ) -> Result<HookAction>;
}

/// Response body streaming
///
/// Synchronous: runs inline for every chunk and must not wait on I/O.
pub trait ResponseBodyHook: Send + Sync {
    fn priority(&self) -> HookPriority {
        HookPriority::NORMAL
    }

    /// Called for each response body chunk, in arrival order
    fn on_body_chunk(
        &self,
        body: &mut Option<Bytes>,
        end_of_stream: bool,
        ctx: &mut PluginContext,
    ) -> Result<()>;
}

/// Logging/telemetry
#[async_trait]
pub trait LoggingHook: Send + Sync {
    fn priority(&self) -> HookPriority {
        HookPriority::NORMAL
    }

    /// Called when request is complete
    async fn on_request_complete(
        &self,
        request: &RequestInfo,
        response: Option<&ResponseInfo>,
        error: Option<&str>,
        ctx: &PluginContext,
    );
}
