//! Process-wide current plugin manager
//!
//! Applications normally run one [`PluginManager`] at a time. Installing a
//! new one always tears the previous one down first, so its leak scan runs
//! and its modules are closed before any new module is opened.

use once_cell::sync::Lazy;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::error::{PluginError, Result};
use crate::manager::{PluginManager, PluginManagerBuilder};

static CURRENT: Lazy<RwLock<Option<PluginManager>>> = Lazy::new(|| RwLock::new(None));

/// Shared access to the installed manager
///
/// Installing or unloading a manager waits until every guard is dropped.
pub type ManagerGuard = MappedRwLockReadGuard<'static, PluginManager>;

/// Replace the current manager with one loaded from `files`
///
/// # Errors
/// Any construction error; the slot is left empty in that case
pub fn load_plugin_configuration_files<I, S>(files: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    load_with(&PluginManagerBuilder::default(), files)
}

/// Replace the current manager with one built by `builder`
///
/// # Errors
/// Any construction error; the slot is left empty in that case
pub fn load_with<I, S>(builder: &PluginManagerBuilder, files: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    unload_plugin_manager();
    let manager = builder.load(files)?;
    install(manager);
    Ok(())
}

/// Replace the current manager with an empty one
pub fn load_without_plugins() {
    unload_plugin_manager();
    install(PluginManager::new());
}

/// Tear down the current manager, if any
pub fn unload_plugin_manager() {
    let previous = CURRENT.write().take();
    // Teardown runs outside the lock so plugin code may query the slot
    drop(previous);
}

/// The current manager
///
/// # Errors
/// [`PluginError::NoManager`] when nothing is installed
pub fn plugin_manager() -> Result<ManagerGuard> {
    RwLockReadGuard::try_map(CURRENT.read(), Option::as_ref).map_err(|_| PluginError::NoManager)
}

/// Whether a manager is installed
#[must_use]
pub fn is_loaded() -> bool {
    CURRENT.read().is_some()
}

/// Make the current manager panic at teardown if extensions are still held
///
/// # Errors
/// [`PluginError::NoManager`] when nothing is installed
pub fn enable_strict_shutdown_checking() -> Result<()> {
    plugin_manager()?.fail_hard_at_shutdown_if_cached_plugins_remain();
    Ok(())
}

fn install(manager: PluginManager) {
    let previous = CURRENT.write().replace(manager);
    drop(previous);
}
