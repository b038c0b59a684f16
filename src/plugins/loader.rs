//! Dynamic module loading primitives
//!
//! The manager only ever opens a module, resolves its entry point and closes
//! it again. [`LibraryLoader`] does this with the operating system's dynamic
//! loader through `libloading`; [`StaticModuleLoader`] serves plugins that are
//! linked into the host binary.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use libloading::Library;
use parking_lot::{Mutex, RwLock};

use super::api::{Plugin, PluginCreate, PLUGIN_CREATOR_SYMBOL};

/// Entry point resolved from a module, returns `None` when the plugin is invalid
pub type PluginFactory = Arc<dyn Fn() -> Option<Box<dyn Plugin>> + Send + Sync>;

/// Opaque handle to an opened module
pub struct ModuleHandle(Box<dyn Any + Send + Sync>);

impl ModuleHandle {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Recover the loader specific handle
    ///
    /// # Errors
    /// Gives the handle back unchanged if it does not hold a `T`
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self.0.downcast::<T>() {
            Ok(inner) => Ok(*inner),
            Err(inner) => Err(Self(inner)),
        }
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleHandle(..)")
    }
}

/// Primitive operations on dynamic modules
pub trait ModuleLoader: Send + Sync {
    /// Open the module at `path`
    fn open(&self, path: &Path) -> Result<ModuleHandle>;

    /// Look up a plugin factory exported under `symbol`
    fn resolve(&self, handle: &ModuleHandle, symbol: &str) -> Option<PluginFactory>;

    /// Close a module; failures are reported but never fatal
    fn close(&self, handle: ModuleHandle) -> Result<()>;
}

/// Loads plugin modules from shared libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

impl LibraryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for LibraryLoader {
    fn open(&self, path: &Path) -> Result<ModuleHandle> {
        let library = open_library(path)?;
        Ok(ModuleHandle::new(library))
    }

    fn resolve(&self, handle: &ModuleHandle, symbol: &str) -> Option<PluginFactory> {
        let library = handle.downcast_ref::<Library>()?;

        // Safety: the symbol is declared through declare_plugin!, which has
        // exactly the PluginCreate signature
        let create: PluginCreate = unsafe { *library.get::<PluginCreate>(symbol.as_bytes()).ok()? };

        Some(Arc::new(move || {
            // Safety: the library stays open while the factory is used,
            // the manager calls it right after resolving
            let plugin_ptr = unsafe { create() };
            if plugin_ptr.is_null() {
                return None;
            }
            // Safety: the creator hands over a pointer from Box::into_raw
            Some(unsafe { Box::from_raw(plugin_ptr) })
        }))
    }

    fn close(&self, handle: ModuleHandle) -> Result<()> {
        let library = handle
            .downcast::<Library>()
            .map_err(|_| anyhow!("Module handle was not opened by LibraryLoader"))?;
        library.close().context("Failed to close plugin library")
    }
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    // Safety: running a plugin's initialisers is what loading it means
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }?;
    Ok(library.into())
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library> {
    // Safety: running a plugin's initialisers is what loading it means
    let library = unsafe { Library::new(path) }?;
    Ok(library)
}

/// Open and close notifications recorded by [`StaticModuleLoader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    Opened(PathBuf),
    Closed(PathBuf),
}

/// Serves plugins compiled into the host, addressed by a virtual path
///
/// ```
/// use pim::plugins::{Plugin, StaticModuleLoader};
///
/// struct Builtin;
/// impl Plugin for Builtin {}
///
/// let loader = StaticModuleLoader::new();
/// loader.register("/builtin/libcore.so", || Box::new(Builtin));
/// ```
#[derive(Default)]
pub struct StaticModuleLoader {
    modules: RwLock<HashMap<PathBuf, HashMap<String, PluginFactory>>>,
    events: Mutex<Vec<LoaderEvent>>,
}

impl StaticModuleLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module whose entry point always creates a plugin
    pub fn register<F>(&self, path: impl Into<PathBuf>, create: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        let factory: PluginFactory = Arc::new(move || Some(create()));
        self.register_factory(path, PLUGIN_CREATOR_SYMBOL, factory);
    }

    /// Register an arbitrary factory under `symbol`
    pub fn register_factory(&self, path: impl Into<PathBuf>, symbol: &str, factory: PluginFactory) {
        self.modules
            .write()
            .entry(path.into())
            .or_default()
            .insert(symbol.to_string(), factory);
    }

    /// Register a module that exports nothing
    pub fn register_without_entry_point(&self, path: impl Into<PathBuf>) {
        self.modules.write().entry(path.into()).or_default();
    }

    /// Every open and close so far, in order
    #[must_use]
    pub fn events(&self) -> Vec<LoaderEvent> {
        self.events.lock().clone()
    }

    /// How many times `path` has been opened
    #[must_use]
    pub fn open_count(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, LoaderEvent::Opened(p) if p == path))
            .count()
    }

    /// Whether `path` has been opened more often than closed
    #[must_use]
    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let balance = self.events.lock().iter().fold(0isize, |balance, event| match event {
            LoaderEvent::Opened(p) if p == path => balance + 1,
            LoaderEvent::Closed(p) if p == path => balance - 1,
            _ => balance,
        });
        balance > 0
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn open(&self, path: &Path) -> Result<ModuleHandle> {
        if !self.modules.read().contains_key(path) {
            anyhow::bail!("no static module registered at {}", path.display());
        }
        self.events.lock().push(LoaderEvent::Opened(path.to_path_buf()));
        Ok(ModuleHandle::new(path.to_path_buf()))
    }

    fn resolve(&self, handle: &ModuleHandle, symbol: &str) -> Option<PluginFactory> {
        let path = handle.downcast_ref::<PathBuf>()?;
        self.modules.read().get(path)?.get(symbol).cloned()
    }

    fn close(&self, handle: ModuleHandle) -> Result<()> {
        let path = handle
            .downcast::<PathBuf>()
            .map_err(|_| anyhow!("Module handle was not opened by StaticModuleLoader"))?;
        self.events.lock().push(LoaderEvent::Closed(path));
        Ok(())
    }
}
