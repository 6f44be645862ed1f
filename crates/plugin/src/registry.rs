//! Plugin registry for managing plugin instances

use crate::error::{PluginError, Result};
use crate::hooks::*;
use crate::plugin::Plugin;
use crate::priority::HookPriority;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Plugin factory function type
pub type PluginFactory = fn() -> Box<dyn Plugin>;

/// Shared handle to a running plugin instance
pub type PluginInstance = Arc<RwLock<Box<dyn Plugin>>>;

type HookTable<T> = RwLock<BTreeMap<HookPriority, Vec<RegisteredHook<Arc<T>>>>>;

/// Registered hook with priority
struct RegisteredHook<T> {
    name: String,
    hook: T,
}

fn register<T: ?Sized>(table: &HookTable<T>, priority: HookPriority, name: &str, hook: Arc<T>) {
    table.write().entry(priority).or_default().push(RegisteredHook {
        name: name.to_string(),
        hook,
    });
}

fn ordered<T: ?Sized>(table: &HookTable<T>) -> Vec<Arc<T>> {
    table
        .read()
        .values()
        .flat_map(|v| v.iter().map(|h| h.hook.clone()))
        .collect()
}

fn unregister<T: ?Sized>(table: &HookTable<T>, name: &str) -> usize {
    let mut hooks = table.write();
    let mut removed = 0;
    for registered in hooks.values_mut() {
        let before = registered.len();
        registered.retain(|h| h.name != name);
        removed += before - registered.len();
    }
    hooks.retain(|_, v| !v.is_empty());
    removed
}

/// Plugin registry: factories, running instances and hook lists
pub struct PluginRegistry {
    /// Registered plugin factories (for creating instances)
    factories: RwLock<HashMap<String, PluginFactory>>,

    /// Active plugin instances
    instances: RwLock<HashMap<String, PluginInstance>>,

    /// Hook registrations by type and priority
    request_filter_hooks: HookTable<dyn RequestFilterHook>,
    response_body_hooks: HookTable<dyn ResponseBodyHook>,
    logging_hooks: HookTable<dyn LoggingHook>,
}

impl PluginRegistry {
    /// Create a new plugin registry
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            request_filter_hooks: RwLock::new(BTreeMap::new()),
            response_body_hooks: RwLock::new(BTreeMap::new()),
            logging_hooks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a plugin factory
    pub fn register_factory(&self, name: &str, factory: PluginFactory) -> Result<()> {
        let mut factories = self.factories.write();
        if factories.contains_key(name) {
            return Err(PluginError::AlreadyRegistered(name.to_string()));
        }
        factories.insert(name.to_string(), factory);
        info!(plugin = %name, "Registered plugin factory");
        Ok(())
    }

    /// Create, initialize and start a plugin instance
    pub fn create_instance(&self, name: &str, config: &str) -> Result<()> {
        let factory = {
            let factories = self.factories.read();
            factories.get(name).copied()
        };

        let factory = factory.ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        let mut plugin = factory();
        let metadata = plugin.metadata().clone();

        if metadata.api_version != crate::PLUGIN_API_VERSION {
            return Err(PluginError::AbiMismatch {
                expected: crate::PLUGIN_API_VERSION,
                actual: metadata.api_version,
            });
        }

        plugin.init(config)?;
        plugin.start()?;

        let previous = self
            .instances
            .write()
            .insert(name.to_string(), Arc::new(RwLock::new(plugin)));
        if let Some(previous) = previous {
            if let Err(e) = previous.write().stop() {
                warn!(plugin = %name, error = %e, "Failed to stop replaced plugin instance");
            }
        }

        info!(
            plugin = %name,
            version = %metadata.version,
            "Created plugin instance"
        );
        Ok(())
    }

    /// Get a plugin instance
    pub fn get_instance(&self, name: &str) -> Option<PluginInstance> {
        self.instances.read().get(name).cloned()
    }

    /// Stop and remove a plugin instance along with its hooks
    pub fn remove_instance(&self, name: &str) -> Result<()> {
        let instance = self.instances.write().remove(name);
        let hooks = self.unregister_hooks(name);
        if let Some(instance) = instance {
            instance.write().stop()?;
            info!(plugin = %name, hooks = hooks, "Removed plugin instance");
        }
        Ok(())
    }

    /// Apply a new configuration to a running instance
    ///
    /// Hooks stay registered; the plugin keeps them working across the reload.
    pub fn reload_instance(&self, name: &str, config: &str) -> Result<()> {
        let instance = self
            .get_instance(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        let mut plugin = instance.write();
        if !plugin.metadata().supports_reload {
            return Err(PluginError::StateError(format!(
                "{} does not support reload",
                name
            )));
        }
        plugin.reload(config)?;
        info!(plugin = %name, "Reloaded plugin instance");
        Ok(())
    }

    /// List all registered plugin names
    pub fn list_factories(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    /// List all active plugin instances
    pub fn list_instances(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    /// Check if a factory is registered
    pub fn has_factory(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Get the number of active instances
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Register a request filter hook
    pub fn register_request_filter_hook(&self, name: &str, hook: Arc<dyn RequestFilterHook>) {
        let priority = hook.priority();
        register(&self.request_filter_hooks, priority, name, hook);
        debug!(plugin = %name, ?priority, "Registered RequestFilterHook");
    }

    /// Register a response body hook
    pub fn register_response_body_hook(&self, name: &str, hook: Arc<dyn ResponseBodyHook>) {
        let priority = hook.priority();
        register(&self.response_body_hooks, priority, name, hook);
        debug!(plugin = %name, ?priority, "Registered ResponseBodyHook");
    }

    /// Register a logging hook
    pub fn register_logging_hook(&self, name: &str, hook: Arc<dyn LoggingHook>) {
        let priority = hook.priority();
        register(&self.logging_hooks, priority, name, hook);
        debug!(plugin = %name, ?priority, "Registered LoggingHook");
    }

    /// Remove every hook registered under `name`; returns how many were removed
    pub fn unregister_hooks(&self, name: &str) -> usize {
        unregister(&self.request_filter_hooks, name)
            + unregister(&self.response_body_hooks, name)
            + unregister(&self.logging_hooks, name)
    }

    /// Get all request filter hooks in priority order
    pub fn get_request_filter_hooks(&self) -> Vec<Arc<dyn RequestFilterHook>> {
        ordered(&self.request_filter_hooks)
    }

    /// Get all response body hooks in priority order
    pub fn get_response_body_hooks(&self) -> Vec<Arc<dyn ResponseBodyHook>> {
        ordered(&self.response_body_hooks)
    }

    /// Get all logging hooks in priority order
    pub fn get_logging_hooks(&self) -> Vec<Arc<dyn LoggingHook>> {
        ordered(&self.logging_hooks)
    }

    /// Stop all plugin instances
    pub fn stop_all(&self) {
        let instances: Vec<_> = self.instances.write().drain().collect();
        if instances.is_empty() {
            return;
        }
        for (name, instance) in instances {
            if let Err(e) = instance.write().stop() {
                warn!(plugin = %name, error = %e, "Failed to stop plugin");
            }
        }
        info!("Stopped all plugin instances");
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
