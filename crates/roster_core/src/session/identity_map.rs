//! Per-session identity map with change-detection snapshots.

use super::Managed;
use crate::model::Entity;
use crate::repo::{RepoError, RepoResult};
use std::collections::BTreeMap;
use std::rc::Rc;

struct ManagedEntry<E> {
    instance: Managed<E>,
    /// State as last read from or written to the store.
    snapshot: E,
    read_only: bool,
}

/// Maps entity id to the single managed instance for that id.
///
/// Ordered by id so flushes write rows deterministically.
pub struct IdentityMap<E> {
    entries: BTreeMap<i64, ManagedEntry<E>>,
}

impl<E> Default for IdentityMap<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: Entity> IdentityMap<E> {
    pub(crate) fn get(&self, id: i64) -> Option<Managed<E>> {
        self.entries.get(&id).map(|entry| Rc::clone(&entry.instance))
    }

    pub(crate) fn register(&mut self, id: i64, instance: Managed<E>, snapshot: E, read_only: bool) {
        self.entries.insert(
            id,
            ManagedEntry {
                instance,
                snapshot,
                read_only,
            },
        );
    }

    pub(crate) fn remove(&mut self, id: i64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains_instance(&self, instance: &Managed<E>) -> bool {
        self.entries
            .values()
            .any(|entry| Rc::ptr_eq(&entry.instance, instance))
    }

    pub(crate) fn is_read_only(&self, id: i64) -> bool {
        self.entries.get(&id).is_some_and(|entry| entry.read_only)
    }

    /// Current state of every writable instance that differs from its snapshot.
    pub(crate) fn dirty(&self) -> RepoResult<Vec<(i64, E)>> {
        let mut dirty = Vec::new();
        for (id, entry) in &self.entries {
            if entry.read_only {
                continue;
            }
            let current = entry
                .instance
                .try_borrow()
                .map_err(|_| RepoError::EntityBorrowed(E::meta().name))?;
            if *current != entry.snapshot {
                dirty.push((*id, current.clone()));
            }
        }
        Ok(dirty)
    }

    pub(crate) fn mark_clean(&mut self, id: i64, state: E) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.snapshot = state;
        }
    }
}
