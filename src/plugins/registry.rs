//! Extension registry: interface id to the handles providing it

use std::collections::BTreeMap;

use serde::Serialize;

use super::api::InterfaceId;
use super::module::ExtensionHandle;

/// Handles still retained outside the registry for one interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutstandingReference {
    pub interface: InterfaceId,
    pub count: usize,
}

/// Extensions grouped by interface, in load order within each group
///
/// Filled while the manager loads plugins and read-only afterwards.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: BTreeMap<InterfaceId, Vec<ExtensionHandle>>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, handle: ExtensionHandle) {
        self.entries.entry(handle.id()).or_default().push(handle);
    }

    /// Handles for `interface`; empty when nothing provides it
    #[must_use]
    pub fn get(&self, interface: &str) -> &[ExtensionHandle] {
        self.entries.get(interface).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of extensions providing `interface`
    #[must_use]
    pub fn count(&self, interface: &str) -> usize {
        self.get(interface).len()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InterfaceId, &[ExtensionHandle])> {
        self.entries.iter().map(|(id, handles)| (id, handles.as_slice()))
    }

    /// Total number of registered extensions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interfaces whose handles are still held by someone besides the registry
    #[must_use]
    pub fn outstanding_references(&self) -> Vec<OutstandingReference> {
        self.entries
            .iter()
            .filter_map(|(interface, handles)| {
                let count: usize = handles.iter().map(|h| h.use_count() - 1).sum();
                (count > 0).then(|| OutstandingReference {
                    interface: interface.clone(),
                    count,
                })
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
