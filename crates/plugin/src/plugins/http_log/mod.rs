//! HTTP Log Plugin
//!
//! Captures request/response bodies while a request streams through the
//! pipeline and, once it completes, ships a serialized log entry to a remote
//! collector. Delivery runs on a detached task; the logging hook returns as
//! soon as the task is scheduled.

pub mod capture;
pub mod serializer;

use crate::context::PluginContext;
use crate::error::{PluginError, Result};
use crate::hooks::{HookAction, LoggingHook, RequestFilterHook, RequestInfo, ResponseBodyHook, ResponseInfo};
use crate::plugin::{Plugin, PluginMetadata};
use crate::priority::HookPriority;
use crate::registry::PluginRegistry;
use async_trait::async_trait;
use bytes::Bytes;
use config::HttpLogConfig;
use delivery::{DeferredScheduler, DeliveryClient, DeliveryStats, DeliveryTask};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use capture::CapturedExchange;
pub use serializer::{JsonSerializer, Serializer, Snapshot};

/// Registered plugin name, also the label on delivery log lines
pub const PLUGIN_NAME: &str = "http_log";

/// Settings resolved from [`HttpLogConfig`] at start
#[derive(Debug, Clone)]
struct Settings {
    endpoint: String,
    method: String,
    timeout: Duration,
    keepalive: Duration,
    log_request_body: bool,
    log_response_body: bool,
    body_limit: Option<usize>,
}

impl Settings {
    fn from_config(config: &HttpLogConfig) -> Result<Self> {
        Ok(Self {
            endpoint: config.http_endpoint.trim().to_string(),
            method: config.method.clone(),
            timeout: config.timeout_duration()?,
            keepalive: config.keepalive_duration()?,
            log_request_body: config.log_request_body,
            log_response_body: config.log_response_body,
            body_limit: config.body_limit(),
        })
    }
}

/// What the hooks of a running plugin deliver with
///
/// Shared between the plugin and every hook it hands out, so a reload takes
/// effect without re-registering hooks.
struct Active {
    settings: Arc<Settings>,
    scheduler: DeferredScheduler,
}

fn build_scheduler(config: &HttpLogConfig) -> Result<DeferredScheduler> {
    let client = DeliveryClient::new(config.tls_verify)
        .map_err(|e| PluginError::InitError(format!("Failed to build TLS config: {}", e)))?;
    DeferredScheduler::from_current(Arc::new(client)).map_err(|e| PluginError::InitError(e.to_string()))
}

fn parse_config(config: &str) -> Result<HttpLogConfig> {
    if config.trim().is_empty() {
        return Err(PluginError::ConfigError(
            "http_log requires an http_endpoint".to_string(),
        ));
    }
    Ok(HttpLogConfig::from_json(config)?)
}

/// HTTP Log Plugin
pub struct HttpLogPlugin {
    metadata: PluginMetadata,
    config: Option<HttpLogConfig>,
    active: Option<Arc<RwLock<Active>>>,
}

impl HttpLogPlugin {
    pub fn new() -> Self {
        let metadata = PluginMetadata::new(PLUGIN_NAME, env!("CARGO_PKG_VERSION"))
            .with_description("Ships request/response log entries to an HTTP collector")
            .with_reload_support();

        Self {
            metadata,
            config: None,
            active: None,
        }
    }

    /// Hook set for the running plugin
    pub fn get_hook(&self) -> Option<HttpLogHook> {
        self.active.as_ref().map(|active| HttpLogHook {
            active: active.clone(),
            serializer: Arc::new(JsonSerializer),
        })
    }

    pub fn config(&self) -> Option<&HttpLogConfig> {
        self.config.as_ref()
    }

    /// Delivery counters of the current scheduler
    pub fn stats(&self) -> Option<DeliveryStats> {
        self.active.as_ref().map(|active| active.read().scheduler.stats())
    }
}

impl Default for HttpLogPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for HttpLogPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn init(&mut self, config: &str) -> Result<()> {
        self.config = Some(parse_config(config)?);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| PluginError::StateError("http_log started before init".to_string()))?;

        let settings = Settings::from_config(config)?;
        let scheduler = build_scheduler(config)?;

        info!(
            endpoint = %settings.endpoint,
            method = %settings.method,
            timeout = ?settings.timeout,
            keepalive = ?settings.keepalive,
            "HTTP log plugin started"
        );

        self.active = Some(Arc::new(RwLock::new(Active {
            settings: Arc::new(settings),
            scheduler,
        })));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            let active = active.read();
            active.scheduler.close();
            active.scheduler.client().pool().clear();
            let stats = active.scheduler.stats();
            info!(
                delivered = stats.delivered,
                failed = stats.failed,
                in_flight = stats.in_flight,
                "HTTP log plugin stopped"
            );
        }
        Ok(())
    }

    /// Swap settings under the registered hooks
    ///
    /// The scheduler is only replaced when `tls_verify` changes; the old one
    /// is closed and finishes its in-flight deliveries.
    fn reload(&mut self, config: &str) -> Result<()> {
        let Some(active) = self.active.clone() else {
            self.init(config)?;
            return self.start();
        };

        let new_config = parse_config(config)?;
        let settings = Settings::from_config(&new_config)?;
        let tls_changed = self
            .config
            .as_ref()
            .map_or(true, |old| old.tls_verify != new_config.tls_verify);
        let scheduler = if tls_changed {
            Some(build_scheduler(&new_config)?)
        } else {
            None
        };

        info!(
            endpoint = %settings.endpoint,
            method = %settings.method,
            new_scheduler = tls_changed,
            "HTTP log plugin reloaded"
        );

        let replaced = {
            let mut active = active.write();
            active.settings = Arc::new(settings);
            scheduler.map(|scheduler| std::mem::replace(&mut active.scheduler, scheduler))
        };
        if let Some(old) = replaced {
            old.close();
            old.client().pool().clear();
        }
        self.config = Some(new_config);
        Ok(())
    }

    fn health_check(&self) -> bool {
        self.active.is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Hook implementation for HTTP log shipping
#[derive(Clone)]
pub struct HttpLogHook {
    active: Arc<RwLock<Active>>,
    serializer: Arc<dyn Serializer>,
}

impl HttpLogHook {
    /// Replace the payload encoding
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Scheduler deliveries currently go through
    pub fn scheduler(&self) -> DeferredScheduler {
        self.active.read().scheduler.clone()
    }

    fn settings(&self) -> Arc<Settings> {
        self.active.read().settings.clone()
    }
}

#[async_trait]
impl RequestFilterHook for HttpLogHook {
    fn priority(&self) -> HookPriority {
        HookPriority::EARLY
    }

    async fn on_request(&self, request: &RequestInfo, ctx: &mut PluginContext) -> Result<HookAction> {
        let settings = self.settings();
        if settings.log_request_body {
            if let Some(body) = &request.body {
                capture::capture_request_body(ctx, body, settings.body_limit);
            }
        }
        Ok(HookAction::Continue)
    }
}

impl ResponseBodyHook for HttpLogHook {
    fn priority(&self) -> HookPriority {
        HookPriority::LAST
    }

    fn on_body_chunk(&self, body: &mut Option<Bytes>, _end_of_stream: bool, ctx: &mut PluginContext) -> Result<()> {
        let settings = self.settings();
        if settings.log_response_body {
            if let Some(chunk) = body {
                capture::capture_response_chunk(ctx, chunk, settings.body_limit);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LoggingHook for HttpLogHook {
    fn priority(&self) -> HookPriority {
        HookPriority::LATE
    }

    async fn on_request_complete(
        &self,
        request: &RequestInfo,
        response: Option<&ResponseInfo>,
        error: Option<&str>,
        ctx: &PluginContext,
    ) {
        let exchange = capture::take_exchange(ctx);
        let snapshot = Snapshot {
            request,
            response,
            error,
            ctx,
            exchange: &exchange,
        };

        let payload = match self.serializer.serialize(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(plugin = PLUGIN_NAME, error = %e, "Failed to serialize log entry");
                return;
            }
        };

        let settings = self.settings();
        let task = DeliveryTask::new(settings.endpoint.clone(), payload, PLUGIN_NAME)
            .with_method(settings.method.clone())
            .with_timeout(settings.timeout)
            .with_keepalive(settings.keepalive);

        if let Err(e) = self.scheduler().schedule(task) {
            warn!(plugin = PLUGIN_NAME, target = %settings.endpoint, error = %e, "Log entry dropped");
        }
    }
}

/// Create the `http_log` instance from `config` and register its hooks
pub fn enable_http_log(registry: &PluginRegistry, config: &HttpLogConfig) -> Result<()> {
    let json = serde_json::to_string(config).map_err(|e| PluginError::ConfigError(e.to_string()))?;
    registry.create_instance(PLUGIN_NAME, &json)?;

    let instance = registry
        .get_instance(PLUGIN_NAME)
        .ok_or_else(|| PluginError::NotFound(PLUGIN_NAME.to_string()))?;
    let hook = instance
        .read()
        .as_any()
        .downcast_ref::<HttpLogPlugin>()
        .and_then(HttpLogPlugin::get_hook)
        .ok_or_else(|| PluginError::StateError("http_log is not running".to_string()))?;

    let hook = Arc::new(hook);
    registry.unregister_hooks(PLUGIN_NAME);
    registry.register_request_filter_hook(PLUGIN_NAME, hook.clone());
    registry.register_response_body_hook(PLUGIN_NAME, hook.clone());
    registry.register_logging_hook(PLUGIN_NAME, hook);
    Ok(())
}
