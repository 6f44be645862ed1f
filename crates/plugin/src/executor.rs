//! Hook executor for running hooks in priority order

use crate::context::PluginContext;
use crate::error::Result;
use crate::hooks::*;
use crate::registry::PluginRegistry;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Hook executor that runs hooks in priority order
pub struct HookExecutor {
    registry: Arc<PluginRegistry>,
}

impl HookExecutor {
    /// Create a new hook executor
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Run all request filter hooks
    pub async fn run_request_filter_hooks(
        &self,
        request: &RequestInfo,
        ctx: &mut PluginContext,
    ) -> Result<HookAction> {
        let hooks = self.registry.get_request_filter_hooks();
        trace!(count = hooks.len(), "Running request filter hooks");

        for hook in hooks {
            match hook.on_request(request, ctx).await {
                Ok(HookAction::Continue) => continue,
                Ok(HookAction::SkipPhase) => {
                    debug!("Request filter hook requested phase skip");
                    return Ok(HookAction::Continue);
                }
                Ok(HookAction::ShortCircuit) => {
                    debug!("Request filter hook short-circuited request");
                    return Ok(HookAction::ShortCircuit);
                }
                Err(e) => {
                    warn!(error = %e, "Request filter hook error");
                    return Err(e);
                }
            }
        }

        Ok(HookAction::Continue)
    }

    /// Run all response body hooks for one chunk
    pub fn run_response_body_hooks(
        &self,
        body: &mut Option<Bytes>,
        end_of_stream: bool,
        ctx: &mut PluginContext,
    ) -> Result<()> {
        let hooks = self.registry.get_response_body_hooks();
        trace!(count = hooks.len(), eos = end_of_stream, "Running response body hooks");

        for hook in hooks {
            if let Err(e) = hook.on_body_chunk(body, end_of_stream, ctx) {
                warn!(error = %e, "Response body hook error");
                return Err(e);
            }
        }

        Ok(())
    }

    /// Run all logging hooks
    pub async fn run_logging_hooks(
        &self,
        request: &RequestInfo,
        response: Option<&ResponseInfo>,
        error: Option<&str>,
        ctx: &PluginContext,
    ) {
        let hooks = self.registry.get_logging_hooks();
        trace!(count = hooks.len(), "Running logging hooks");

        for hook in hooks {
            hook.on_request_complete(request, response, error, ctx).await;
        }
    }
}

impl Clone for HookExecutor {
    fn clone(&self) -> Self {
        Self::new(self.registry.clone())
    }
}
