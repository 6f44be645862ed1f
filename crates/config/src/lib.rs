//! relaylog-config: Configuration for relaylog
//!
//! This crate provides the `http_log` configuration block, duration parsing
//! and validation shared by the plugin and the command-line tool.

pub mod config;

pub use config::*;
