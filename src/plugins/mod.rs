// Plugin system: native modules exposing extensions to each other
// - Dynamic loading with libloading
// - Extension handles that keep their module loaded
// - Cardinality-checked dependency wiring
pub mod api;
pub mod loader;
pub mod module;
pub mod registry;
pub mod resolver;

pub use api::{AsAny, Dependency, Extension, InterfaceId, Plugin, PluginCreate, PLUGIN_CREATOR_SYMBOL};
pub use loader::{LibraryLoader, LoaderEvent, ModuleHandle, ModuleLoader, PluginFactory, StaticModuleLoader};
pub use module::{ExtensionHandle, LoadedModule};
pub use registry::{ExtensionRegistry, OutstandingReference};
pub use resolver::check_cardinality;
