//! Resolution of logical plugin and configuration names to filesystem paths
//!
//! Lookup order, first match wins:
//! 1. the name itself, when it exists or is absolute
//! 2. each directory listed in the kind's environment variable
//! 3. `<application dir>/<default subdir>/<name>`, without an existence check

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{PluginError, Result};
use crate::logging;

/// Environment variable searched for configuration files
pub const CONFIG_PATH_VAR: &str = "PLUGIN_CONFIG_PATH";

/// Environment variable searched for plugin modules
pub const PLUGIN_PATH_VAR: &str = "PLUGIN_PATH";

/// Class of resource being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Config,
    Plugin,
}

impl ResourceKind {
    /// Environment variable consulted by default for this kind
    #[must_use]
    pub fn default_env_var(self) -> &'static str {
        match self {
            Self::Config => CONFIG_PATH_VAR,
            Self::Plugin => PLUGIN_PATH_VAR,
        }
    }

    /// Subdirectory of the application directory used as last resort
    #[must_use]
    pub fn default_subdir(self) -> &'static str {
        match self {
            Self::Config => "",
            Self::Plugin => "plugins",
        }
    }
}

/// Resolves names using the environment and the running program's location
#[derive(Debug, Clone)]
pub struct PathResolver {
    config_var: String,
    plugin_var: String,
    application_dir: Option<PathBuf>,
}

impl PathResolver {
    /// Resolver reading [`CONFIG_PATH_VAR`] and [`PLUGIN_PATH_VAR`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_var: CONFIG_PATH_VAR.to_string(),
            plugin_var: PLUGIN_PATH_VAR.to_string(),
            application_dir: None,
        }
    }

    /// Read a different environment variable for `kind`
    #[must_use]
    pub fn with_env_var(mut self, kind: ResourceKind, var: impl Into<String>) -> Self {
        match kind {
            ResourceKind::Config => self.config_var = var.into(),
            ResourceKind::Plugin => self.plugin_var = var.into(),
        }
        self
    }

    /// Use `dir` instead of the running executable's directory for the fallback
    #[must_use]
    pub fn with_application_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.application_dir = Some(dir.into());
        self
    }

    /// Environment variable consulted for `kind`
    #[must_use]
    pub fn env_var(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Config => &self.config_var,
            ResourceKind::Plugin => &self.plugin_var,
        }
    }

    /// Resolve a configuration file name
    ///
    /// # Errors
    /// Returns [`PluginError::InvalidArgument`] if `name` is empty
    pub fn resolve_config(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        self.resolve(name, ResourceKind::Config)
    }

    /// Resolve a plugin module name
    ///
    /// # Errors
    /// Returns [`PluginError::InvalidArgument`] if `name` is empty
    pub fn resolve_plugin(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        self.resolve(name, ResourceKind::Plugin)
    }

    /// Resolve `name` for the given resource kind
    ///
    /// # Errors
    /// Returns [`PluginError::InvalidArgument`] if `name` is empty
    pub fn resolve(&self, name: impl AsRef<Path>, kind: ResourceKind) -> Result<PathBuf> {
        let name = name.as_ref();
        if name.as_os_str().is_empty() {
            return Err(PluginError::InvalidArgument(
                "Received blank filename while resolving a plugin path".to_string(),
            ));
        }

        // Absolute paths are trusted verbatim
        if name.exists() || name.is_absolute() {
            return Ok(name.to_path_buf());
        }

        let search = std::env::var_os(self.env_var(kind));
        if let Some(found) = search_dirs(search, name) {
            return Ok(found);
        }

        let base = self
            .application_dir
            .clone()
            .or_else(application_dir)
            .unwrap_or_default();
        Ok(base.join(kind.default_subdir()).join(name))
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn search_dirs(search: Option<OsString>, name: &Path) -> Option<PathBuf> {
    let search = search?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}

/// Directory containing the running executable
///
/// Logs an error and returns `None` when the executable path is unavailable.
#[must_use]
pub fn application_dir() -> Option<PathBuf> {
    match std::env::current_exe() {
        Ok(exe) => exe.parent().map(Path::to_path_buf),
        Err(e) => {
            logging::error(&format!("Failed to read application path: {e}"));
            None
        }
    }
}
