//! Listener registry.
//!
//! # Responsibilities
//! - Own every live `ListenerHandle` on the loop
//! - Resolve `ListenerId` back-references from accept tasks and handlers
//! - Retire handles explicitly; a handle never frees itself

use std::collections::BTreeMap;

use crate::net::{ListenerHandle, ListenerId};

/// Owner of all listeners registered on one event loop.
///
/// Ids are allocated monotonically, so iteration order is creation order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: BTreeMap<ListenerId, ListenerHandle>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, handle: ListenerHandle) {
        let id = handle.id();
        let previous = self.listeners.insert(id, handle);
        assert!(previous.is_none(), "{id} registered twice");
    }

    pub(crate) fn get(&self, id: ListenerId) -> Option<&ListenerHandle> {
        self.listeners.get(&id)
    }

    /// Detach a handle. The caller drops it once the registry borrow ends.
    pub(crate) fn retire(&mut self, id: ListenerId) -> Option<ListenerHandle> {
        self.listeners.remove(&id)
    }

    /// Detach every handle, used when the loop stops.
    pub(crate) fn retire_all(&mut self) -> Vec<ListenerHandle> {
        std::mem::take(&mut self.listeners).into_values().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn ids(&self) -> Vec<ListenerId> {
        self.listeners.keys().copied().collect()
    }
}
