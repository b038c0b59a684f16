//! The plugin manager: loads plugin modules and wires their extensions together
//!
//! Loading runs in phases, each finished for every plugin before the next
//! starts:
//!
//! 0. configuration files are flattened into a plugin list and a skip list
//! 1. every plugin module is opened and its extensions are registered
//! 2. `initialize` is called on every plugin
//! 3. dependencies are checked against the registry and connected
//! 4. `post_dependency_init` is called on every plugin
//!
//! A failure anywhere discards everything loaded so far.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::{self, ConfigurationLoader, FlattenedConfiguration, YamlConfigurationLoader};
use crate::error::Result;
use crate::logging;
use crate::paths::PathResolver;
use crate::plugins::{
    resolver, ExtensionHandle, ExtensionRegistry, InterfaceId, LibraryLoader, LoadedModule,
    ModuleLoader, OutstandingReference,
};

/// Description of one loaded plugin module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub path: PathBuf,
    pub extensions: usize,
}

/// Owns the loaded plugin modules and the extensions they provide
#[derive(Debug)]
pub struct PluginManager {
    registry: ExtensionRegistry,
    modules: Vec<Arc<LoadedModule>>,
    fail_hard_on_shutdown: AtomicBool,
}

impl PluginManager {
    /// A manager with no plugins loaded
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ExtensionRegistry::new(),
            modules: Vec::new(),
            fail_hard_on_shutdown: AtomicBool::new(false),
        }
    }

    /// Builder selecting the module loader, configuration loader and path resolver
    #[must_use]
    pub fn builder() -> PluginManagerBuilder {
        PluginManagerBuilder::default()
    }

    /// Load the plugins named by `files` from shared libraries
    ///
    /// # Errors
    /// Returns the first error raised by any loading phase
    pub fn load<I, S>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder().load(files)
    }

    /// Load the plugins named by a single configuration file
    ///
    /// # Errors
    /// Returns the first error raised by any loading phase
    pub fn load_file(file: impl Into<String>) -> Result<Self> {
        Self::load([file])
    }

    /// Extensions registered for `interface`, in load order
    #[must_use]
    pub fn extensions(&self, interface: &str) -> &[ExtensionHandle] {
        self.registry.get(interface)
    }

    /// First extension registered for `interface`
    #[must_use]
    pub fn first_extension(&self, interface: &str) -> Option<ExtensionHandle> {
        self.extensions(interface).first().cloned()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceId> {
        self.registry.interfaces()
    }

    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn plugin_count(&self) -> usize {
        self.modules.len()
    }

    /// Loaded plugin modules in load order
    #[must_use]
    pub fn plugins(&self) -> Vec<PluginSummary> {
        self.modules
            .iter()
            .map(|module| PluginSummary {
                name: module.name().to_string(),
                path: module.path().to_path_buf(),
                extensions: self
                    .registry
                    .iter()
                    .flat_map(|(_, handles)| handles)
                    .filter(|handle| handle.provided_by(module))
                    .count(),
            })
            .collect()
    }

    /// Panic at teardown instead of only logging when extensions are still held
    ///
    /// This is an ordinary panic, not an abort: a caller that catches it keeps
    /// the process running. No panic is raised while the thread is already
    /// unwinding; the leak is then only logged.
    pub fn fail_hard_at_shutdown_if_cached_plugins_remain(&self) {
        self.fail_hard_on_shutdown.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn fails_hard_at_shutdown(&self) -> bool {
        self.fail_hard_on_shutdown.load(Ordering::SeqCst)
    }

    /// Extension handles currently held outside the manager, per interface
    #[must_use]
    pub fn outstanding_references(&self) -> Vec<OutstandingReference> {
        self.registry.outstanding_references()
    }

    fn report_leaks(&self) {
        let outstanding = self.outstanding_references();
        for leak in &outstanding {
            logging::error(&format!(
                "There are still {} instances of the {} interface still cached when destructing the PluginManager",
                leak.count, leak.interface
            ));
        }

        if !outstanding.is_empty() && self.fails_hard_at_shutdown() && !std::thread::panicking() {
            panic!("Failing hard due to left-over cached plugins, please fix this before merging.");
        }
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        // Root objects first, so handles they were connected to are released.
        // Handles held by plugins of this manager are not counted as leaks,
        // only those held outside it.
        for module in self.modules.iter().rev() {
            module.release_plugin();
        }

        self.report_leaks();

        self.registry.clear();
        while let Some(module) = self.modules.pop() {
            drop(module);
        }
    }
}

/// Configures how a [`PluginManager`] finds and opens its plugins
#[derive(Clone)]
pub struct PluginManagerBuilder {
    module_loader: Arc<dyn ModuleLoader>,
    configuration_loader: Arc<dyn ConfigurationLoader>,
    resolver: PathResolver,
}

impl Default for PluginManagerBuilder {
    fn default() -> Self {
        Self {
            module_loader: Arc::new(LibraryLoader::new()),
            configuration_loader: Arc::new(YamlConfigurationLoader),
            resolver: PathResolver::new(),
        }
    }
}

impl PluginManagerBuilder {
    #[must_use]
    pub fn with_module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.module_loader = loader;
        self
    }

    #[must_use]
    pub fn with_configuration_loader(mut self, loader: Arc<dyn ConfigurationLoader>) -> Self {
        self.configuration_loader = loader;
        self
    }

    #[must_use]
    pub fn with_path_resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn path_resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Flatten `files` and load the resulting plugins
    ///
    /// # Errors
    /// Returns the first error raised by any loading phase
    pub fn load<I, S>(&self, files: I) -> Result<PluginManager>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files = files.into_iter().map(Into::into).collect();
        let flattened = config::flatten(files, &*self.configuration_loader, &self.resolver)?;
        self.load_flattened(&flattened)
    }

    /// Load plugins from an already flattened configuration
    ///
    /// # Errors
    /// Returns the first error raised by any loading phase
    pub fn load_flattened(&self, configuration: &FlattenedConfiguration) -> Result<PluginManager> {
        // Dropping a half-built manager closes whatever was opened
        let mut manager = PluginManager::new();

        for name in &configuration.plugins {
            if configuration.is_skipped(name) {
                logging::info(&format!("Plugin has been skipped, not loading plugin: {name}"));
                continue;
            }

            // Duplicate plugin entries are loaded again, that is a configuration choice
            let module = self.open_module(name)?;
            for extension in module.extensions() {
                manager
                    .registry
                    .register(ExtensionHandle::new(Arc::clone(&module), extension));
            }
            manager.modules.push(module);
        }

        for module in &manager.modules {
            module.initialize()?;
        }

        for module in &manager.modules {
            resolver::connect_dependencies(module, &manager.registry)?;
        }

        for module in &manager.modules {
            module.post_dependency_init()?;
        }

        Ok(manager)
    }

    fn open_module(&self, name: &str) -> Result<Arc<LoadedModule>> {
        let path = self.resolver.resolve_plugin(name)?;
        logging::info(&format!("Loading plugin {}", path.display()));

        let mut module = LoadedModule::open(name, path, Arc::clone(&self.module_loader))?;
        module.instantiate()?;
        Ok(Arc::new(module))
    }
}
