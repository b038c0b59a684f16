//! pim - Plugin interface manager
//!
//! This library loads native plugin modules, registers the extensions they
//! provide, wires extensions into the plugins that depend on them, and keeps
//! every module loaded for as long as any of its extensions is in use.
//!
//! # Modules
//!
//! - [`config`]: Plugin configuration files and include flattening
//! - [`container`]: The process-wide current plugin manager
//! - [`error`]: Error types
//! - [`logging`]: Replaceable info and error sinks
//! - [`manager`]: Plugin manager and its four-phase loading
//! - [`paths`]: Search-path resolution for configuration and plugin files
//! - [`plugins`]: Plugin contract, module loading, extension registry

pub mod config;
pub mod container;
pub mod error;
pub mod logging;
pub mod manager;
pub mod paths;
pub mod plugins;

pub use container::{
    enable_strict_shutdown_checking, is_loaded, load_plugin_configuration_files,
    load_with, load_without_plugins, plugin_manager, unload_plugin_manager, ManagerGuard,
};
pub use error::{DependencyError, PluginError, Result};
pub use manager::{PluginManager, PluginManagerBuilder, PluginSummary};
pub use plugins::{Dependency, Extension, ExtensionHandle, InterfaceId, Plugin};
