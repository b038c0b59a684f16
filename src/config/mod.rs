use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::PluginError;
use crate::logging;
use crate::paths::PathResolver;

/// Contents of one plugin configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfiguration {
    /// Further configuration files to process
    #[serde(default, alias = "includes")]
    pub include: Vec<String>,

    /// Plugin modules to load, in order
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Plugin modules that must not be loaded
    #[serde(default, alias = "skipped")]
    pub skip: Vec<String>,
}

impl PluginConfiguration {
    /// Parse a configuration from YAML text; blank text is an empty configuration
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: PluginConfiguration =
            serde_yaml::from_str(contents).context("Failed to parse plugin configuration")?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::from_yaml_str(&contents)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write config file")?;

        Ok(())
    }
}

/// Source of plugin configurations
pub trait ConfigurationLoader: Send + Sync {
    /// Read the configuration stored at `path`
    fn load(&self, path: &Path) -> Result<PluginConfiguration>;
}

/// Reads YAML configuration files from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlConfigurationLoader;

impl ConfigurationLoader for YamlConfigurationLoader {
    fn load(&self, path: &Path) -> Result<PluginConfiguration> {
        PluginConfiguration::load_from_file(path)
    }
}

/// Every plugin and skip entry reachable from a set of configuration files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenedConfiguration {
    /// Configuration names visited, in processing order
    pub files: Vec<String>,
    /// Plugin names in encounter order, duplicates kept
    pub plugins: Vec<String>,
    /// Plugin names that must not be loaded
    pub skipped: Vec<String>,
}

impl FlattenedConfiguration {
    /// Whether `plugin` appears in the skip list, by exact name
    #[must_use]
    pub fn is_skipped(&self, plugin: &str) -> bool {
        self.skipped.iter().any(|skipped| skipped == plugin)
    }
}

/// Expand `files` and their includes into one plugin and skip list
///
/// Files are taken from the back of the list, includes are pushed onto it.
/// A name already processed is skipped with a notice; names are compared
/// exactly, before path resolution.
///
/// # Errors
/// Returns [`PluginError::Config`] when a file cannot be loaded and
/// [`PluginError::InvalidArgument`] for a blank file name
pub fn flatten(
    files: Vec<String>,
    loader: &dyn ConfigurationLoader,
    resolver: &PathResolver,
) -> crate::error::Result<FlattenedConfiguration> {
    logging::info(&format!("Using configuration files: {}", files.join(", ")));

    let mut pending = files;
    let mut flattened = FlattenedConfiguration::default();

    while let Some(next) = pending.pop() {
        if flattened.files.contains(&next) {
            logging::info(&format!("Found duplicate plugin config file, skipping: {next}"));
            continue;
        }

        let path = resolver.resolve_config(&next)?;
        flattened.files.push(next);

        logging::info(&format!("Loading plugin configuration file: {}", path.display()));

        let configuration = loader
            .load(&path)
            .map_err(|source| PluginError::Config { path, source })?;

        pending.extend(configuration.include);
        flattened.plugins.extend(configuration.plugins);
        flattened.skipped.extend(configuration.skip);
    }

    Ok(flattened)
}
