//! plugin: Plugin host interface for relaylog
//!
//! This crate provides the hook-based plugin architecture a proxy pipeline
//! drives (request filter, response body, logging) and the built-in
//! `http_log` plugin that ships each request's log entry to a collector.

pub mod context;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod plugin;
pub mod plugins;
pub mod priority;
pub mod registry;

pub use context::PluginContext;
pub use error::{PluginError, Result};
pub use executor::HookExecutor;
pub use hooks::*;
pub use plugin::{Plugin, PluginMetadata};
pub use plugins::{enable_http_log, register_builtin_plugins, HttpLogHook, HttpLogPlugin};
pub use priority::HookPriority;
pub use registry::PluginRegistry;

/// Plugin API version for compatibility checking
pub const PLUGIN_API_VERSION: u32 = 1;
