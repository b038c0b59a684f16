//! Loaded modules and the extension handles that keep them alive

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::api::{Dependency, Extension, Plugin, PLUGIN_CREATOR_SYMBOL};
use super::loader::{ModuleHandle, ModuleLoader};
use crate::error::{LifecycleStage, PluginError, Result};
use crate::logging;

/// An opened module together with the root plugin object it produced
///
/// The root object and every extension it created run code from the module,
/// so the module is only closed when the last [`ExtensionHandle`] pointing at
/// it is gone and the root object has been dropped.
pub struct LoadedModule {
    name: String,
    path: PathBuf,
    plugin: Mutex<Option<Box<dyn Plugin>>>,
    handle: Option<ModuleHandle>,
    loader: Arc<dyn ModuleLoader>,
}

impl LoadedModule {
    /// Open the module at `path`
    pub(crate) fn open(name: &str, path: PathBuf, loader: Arc<dyn ModuleLoader>) -> Result<Self> {
        let handle = loader.open(&path).map_err(|e| PluginError::ModuleOpen {
            file: path
                .file_name()
                .unwrap_or(path.as_os_str())
                .to_string_lossy()
                .into_owned(),
            detail: format!("{e:#}"),
        })?;

        Ok(Self {
            name: name.to_string(),
            path,
            plugin: Mutex::new(None),
            handle: Some(handle),
            loader,
        })
    }

    /// Resolve the plugin creator and build the root plugin object
    pub(crate) fn instantiate(&mut self) -> Result<()> {
        let factory = self
            .handle
            .as_ref()
            .and_then(|handle| self.loader.resolve(handle, PLUGIN_CREATOR_SYMBOL))
            .ok_or_else(|| PluginError::MissingEntryPoint {
                path: self.path.clone(),
                symbol: PLUGIN_CREATOR_SYMBOL.to_string(),
            })?;

        let plugin = factory().ok_or_else(|| PluginError::InvalidPlugin {
            path: self.path.clone(),
        })?;
        *self.plugin.get_mut() = Some(plugin);
        Ok(())
    }

    /// Name the module was requested under
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved path the module was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        self.plugin
            .lock()
            .as_ref()
            .map(|plugin| plugin.extensions())
            .unwrap_or_default()
    }

    pub(crate) fn dependencies(&self) -> Vec<Dependency> {
        self.plugin
            .lock()
            .as_ref()
            .map(|plugin| plugin.dependencies())
            .unwrap_or_default()
    }

    pub(crate) fn initialize(&self) -> Result<()> {
        self.call(LifecycleStage::Initialize, |plugin| plugin.initialize())
    }

    pub(crate) fn connect_extension(&self, extension: ExtensionHandle) -> Result<()> {
        self.call(LifecycleStage::ConnectExtension, |plugin| {
            plugin.connect_extension(extension)
        })
    }

    pub(crate) fn post_dependency_init(&self) -> Result<()> {
        self.call(LifecycleStage::PostDependencyInit, |plugin| {
            plugin.post_dependency_init()
        })
    }

    /// Drop the root plugin object, releasing whatever handles it holds
    pub(crate) fn release_plugin(&self) {
        let plugin = self.plugin.lock().take();
        drop(plugin);
    }

    fn call<F>(&self, stage: LifecycleStage, hook: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Plugin) -> anyhow::Result<()>,
    {
        let mut guard = self.plugin.lock();
        let Some(plugin) = guard.as_mut() else {
            return Ok(());
        };
        hook(plugin.as_mut()).map_err(|source| PluginError::Lifecycle {
            plugin: self.name.clone(),
            stage,
            source,
        })
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("instantiated", &self.plugin.lock().is_some())
            .finish()
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        // The root object's code lives in the module, drop it first
        drop(self.plugin.get_mut().take());

        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.loader.close(handle) {
                logging::error(&format!(
                    "Failed to close plugin module {}: {e:#}",
                    self.path.display()
                ));
            }
        }
    }
}

struct Aliased {
    // Declaration order is drop order: the extension goes before its module
    extension: Arc<dyn Extension>,
    module: Arc<LoadedModule>,
}

/// Shared handle to an extension that keeps its defining module loaded
///
/// Cloning shares one reference count for the extension and its module, and
/// dereferencing yields the extension. The module cannot be closed while any
/// clone is alive, wherever that clone ended up.
#[derive(Clone)]
pub struct ExtensionHandle {
    inner: Arc<Aliased>,
}

impl ExtensionHandle {
    pub(crate) fn new(module: Arc<LoadedModule>, extension: Arc<dyn Extension>) -> Self {
        Self {
            inner: Arc::new(Aliased { extension, module }),
        }
    }

    /// The extension object
    #[must_use]
    pub fn extension(&self) -> &dyn Extension {
        &*self.inner.extension
    }

    /// Downcast the extension to its concrete type
    #[must_use]
    pub fn downcast_ref<T: Extension>(&self) -> Option<&T> {
        self.extension().as_any().downcast_ref::<T>()
    }

    /// Number of live handles sharing this extension, including this one
    #[must_use]
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Name of the plugin module that provides the extension
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        self.inner.module.name()
    }

    /// Path of the plugin module that provides the extension
    #[must_use]
    pub fn module_path(&self) -> &Path {
        self.inner.module.path()
    }

    pub(crate) fn provided_by(&self, module: &Arc<LoadedModule>) -> bool {
        Arc::ptr_eq(&self.inner.module, module)
    }

    /// Whether both handles were issued for the same registration
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this handle points at `extension`
    #[must_use]
    pub fn is(&self, extension: &Arc<dyn Extension>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner.extension).cast::<()>(),
            Arc::as_ptr(extension).cast::<()>(),
        )
    }
}

impl Deref for ExtensionHandle {
    type Target = dyn Extension;

    fn deref(&self) -> &Self::Target {
        self.extension()
    }
}

impl fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("interface", &self.id())
            .field("plugin", &self.plugin_name())
            .field("use_count", &self.use_count())
            .finish()
    }
}
