/// Plugin API definitions shared by the host and plugin modules
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use super::module::ExtensionHandle;

/// Symbol every plugin module must export, see [`declare_plugin!`](crate::declare_plugin)
pub const PLUGIN_CREATOR_SYMBOL: &str = "plugin_creator";

/// Function signature for the plugin entry point
///
/// Host and plugins must be built with the same compiler, since trait objects
/// cross the module boundary.
pub type PluginCreate = unsafe fn() -> *mut dyn Plugin;

/// Name of an extension contract
///
/// Extensions reporting equal ids are grouped together in the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct InterfaceId(String);

impl InterfaceId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InterfaceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for InterfaceId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for InterfaceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Upcast helper so consumers can downcast extensions to concrete types
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An object implementing one interface, produced by a plugin
pub trait Extension: AsAny + Send + Sync {
    /// Interface this extension implements
    fn id(&self) -> InterfaceId;
}

/// A plugin's demand for extensions of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub interface: InterfaceId,
    pub min: usize,
    pub max: usize,
}

impl Dependency {
    /// Require between `min` and `max` extensions, inclusive
    pub fn new(interface: impl Into<InterfaceId>, min: usize, max: usize) -> Self {
        Self {
            interface: interface.into(),
            min,
            max,
        }
    }

    /// Require exactly `count` extensions
    pub fn exactly(interface: impl Into<InterfaceId>, count: usize) -> Self {
        Self::new(interface, count, count)
    }

    /// Require at least `min` extensions, without upper bound
    pub fn at_least(interface: impl Into<InterfaceId>, min: usize) -> Self {
        Self::new(interface, min, usize::MAX)
    }

    /// Accept zero or one extension
    pub fn optional(interface: impl Into<InterfaceId>) -> Self {
        Self::new(interface, 0, 1)
    }
}

/// Root object of a plugin module
///
/// Hooks are called by the manager in four phases: `extensions` for every
/// plugin, then `initialize` for every plugin, then one `connect_extension`
/// per matching extension for every declared dependency, then
/// `post_dependency_init`. Any returned error aborts the whole load.
pub trait Plugin: Send {
    /// Extensions provided by this plugin, in registration order
    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        Vec::new()
    }

    /// Extensions this plugin needs from the configuration
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Called once every plugin has been opened and registered
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Receives one matching extension for a declared dependency
    fn connect_extension(&mut self, _extension: ExtensionHandle) -> Result<()> {
        Ok(())
    }

    /// Called once every plugin has had its dependencies connected
    fn post_dependency_init(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Export the plugin entry point from a plugin crate
///
/// ```ignore
/// pim::declare_plugin!(GreeterPlugin, GreeterPlugin::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty, $constructor:path) => {
        #[no_mangle]
        pub fn plugin_creator() -> *mut dyn $crate::plugins::api::Plugin {
            let constructor: fn() -> $plugin_type = $constructor;
            let boxed: ::std::boxed::Box<dyn $crate::plugins::api::Plugin> =
                ::std::boxed::Box::new(constructor());
            ::std::boxed::Box::into_raw(boxed)
        }
    };
}
