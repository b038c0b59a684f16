//! Error taxonomy for plugin loading and manager lifecycle.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::plugins::api::InterfaceId;

/// Result alias used throughout the crate
pub type Result<T, E = PluginError> = std::result::Result<T, E>;

/// Errors raised while building, querying or tearing down a plugin manager
#[derive(Debug, Error)]
pub enum PluginError {
    /// The dynamic module could not be opened
    #[error("Error loading {file}: {detail}")]
    ModuleOpen { file: String, detail: String },

    /// The module was opened but does not export the plugin creator symbol
    #[error(
        "Error loading plugin creator `{symbol}` from {path}. \
         Did you forget to call the declare_plugin! macro?"
    )]
    MissingEntryPoint { path: PathBuf, symbol: String },

    /// The plugin creator returned nothing
    #[error("This plugin does not contain a valid Plugin implementation: {path}")]
    InvalidPlugin { path: PathBuf },

    /// A dependency cardinality bound was violated
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The global slot was queried before a manager was installed
    #[error(
        "There is no plugin manager, did you call load_plugin_configuration_files first?"
    )]
    NoManager,

    /// The configuration loader rejected a file
    #[error("Failed to load plugin configuration file {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A plugin hook returned an error
    #[error("Plugin {plugin} failed during {stage}")]
    Lifecycle {
        plugin: String,
        stage: LifecycleStage,
        #[source]
        source: anyhow::Error,
    },
}

/// Cardinality violations found while connecting dependencies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error(
        "This plugin configuration could not provide enough extensions of type {interface} \
         (found {available}, need at least {min})"
    )]
    NotEnough {
        interface: InterfaceId,
        available: usize,
        min: usize,
    },

    #[error(
        "This plugin configuration provided too many extensions of type {interface} \
         (found {available}, accepts at most {max})"
    )]
    TooMany {
        interface: InterfaceId,
        available: usize,
        max: usize,
    },
}

impl DependencyError {
    /// Interface whose bound was violated
    #[must_use]
    pub fn interface(&self) -> &InterfaceId {
        match self {
            Self::NotEnough { interface, .. } | Self::TooMany { interface, .. } => interface,
        }
    }
}

/// Plugin hook that was running when a lifecycle error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Initialize,
    ConnectExtension,
    PostDependencyInit,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::ConnectExtension => write!(f, "connect_extension"),
            Self::PostDependencyInit => write!(f, "post_dependency_init"),
        }
    }
}
