//! Plugin error types

use thiserror::Error;

/// Plugin error type
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("API version mismatch: expected {expected}, got {actual}")]
    AbiMismatch { expected: u32, actual: u32 },

    #[error("Plugin already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Plugin state error: {0}")]
    StateError(String),
}

impl From<config::ConfigError> for PluginError {
    fn from(e: config::ConfigError) -> Self {
        PluginError::ConfigError(e.to_string())
    }
}

/// Result type alias for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;
