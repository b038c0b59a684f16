//! Dependency resolution between loaded plugins

use super::api::Dependency;
use super::module::LoadedModule;
use super::registry::ExtensionRegistry;
use crate::error::{DependencyError, Result};

/// Check that `available` extensions satisfy the bounds of `dependency`
///
/// # Errors
/// [`DependencyError::NotEnough`] below the minimum,
/// [`DependencyError::TooMany`] above the maximum
pub fn check_cardinality(
    dependency: &Dependency,
    available: usize,
) -> std::result::Result<(), DependencyError> {
    if available < dependency.min {
        return Err(DependencyError::NotEnough {
            interface: dependency.interface.clone(),
            available,
            min: dependency.min,
        });
    }

    if available > dependency.max {
        return Err(DependencyError::TooMany {
            interface: dependency.interface.clone(),
            available,
            max: dependency.max,
        });
    }

    Ok(())
}

/// Validate every dependency of `module` and hand it the matching extensions
///
/// Each matching extension is connected once, in registry order.
pub(crate) fn connect_dependencies(module: &LoadedModule, registry: &ExtensionRegistry) -> Result<()> {
    for dependency in module.dependencies() {
        let matching = registry.get(dependency.interface.name());
        check_cardinality(&dependency, matching.len())?;

        for handle in matching {
            module.connect_extension(handle.clone())?;
        }
    }

    Ok(())
}
