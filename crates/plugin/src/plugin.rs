//! Core Plugin trait definition

use crate::error::Result;
use std::any::Any;

/// Plugin metadata
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    /// Unique plugin identifier
    pub name: String,
    /// Semantic version
    pub version: String,
    /// API version this plugin was built against
    pub api_version: u32,
    /// Human-readable description
    pub description: String,
    /// [`Plugin::reload`] may be called on a running instance
    pub supports_reload: bool,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            api_version: crate::PLUGIN_API_VERSION,
            description: String::new(),
            supports_reload: false,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_reload_support(mut self) -> Self {
        self.supports_reload = true;
        self
    }
}

/// Core Plugin trait that all plugins must implement
pub trait Plugin: Send + Sync {
    /// Return plugin metadata
    fn metadata(&self) -> &PluginMetadata;

    /// Initialize the plugin with configuration (JSON)
    fn init(&mut self, config: &str) -> Result<()>;

    /// Start the plugin (begin processing)
    fn start(&mut self) -> Result<()>;

    /// Stop the plugin gracefully
    fn stop(&mut self) -> Result<()>;

    /// Apply a new configuration to a running instance
    ///
    /// Hooks handed out before the reload must keep working afterwards.
    /// Only called by the registry when `supports_reload` is set.
    fn reload(&mut self, config: &str) -> Result<()> {
        self.stop()?;
        self.init(config)?;
        self.start()
    }

    /// Health check
    fn health_check(&self) -> bool {
        true
    }

    /// Cast to Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Cast to Any mut for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
