//! Built-in plugins for relaylog

pub mod http_log;

pub use http_log::{enable_http_log, HttpLogHook, HttpLogPlugin};

use crate::registry::PluginRegistry;

/// Register all built-in plugins with the registry
pub fn register_builtin_plugins(registry: &PluginRegistry) {
    if let Err(e) = registry.register_factory(http_log::PLUGIN_NAME, || {
        Box::new(HttpLogPlugin::new())
    }) {
        tracing::warn!(error = %e, "Failed to register http_log plugin");
    }

    tracing::info!("Registered built-in plugins");
}
