//! Registry of live operation generations.
//!
//! This module hides how records are indexed and how removal is guarded:
//! - Atomic get-or-create per operation id
//! - Compare-and-delete so a stale eviction never removes a newer generation
//! - Exclusion between record removal and the executor signalling completion

mod record;

pub use record::Record;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent map from operation id to its live [`Record`].
///
/// Backed by DashMap: every operation takes one shard lock for O(1) work.
/// Operation bodies and waits never run while a shard lock is held.
pub struct Registry<T, E> {
    entries: DashMap<String, Arc<Record<T, E>>>,
}

impl<T, E> Registry<T, E> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the live record for `operation_id`, creating it with `factory`
    /// if there is none.
    ///
    /// The boolean is true when this call inserted the record; exactly one
    /// concurrent caller per generation observes true.
    pub fn get_or_insert_with<F>(&self, operation_id: &str, factory: F) -> (Arc<Record<T, E>>, bool)
    where
        F: FnOnce() -> Record<T, E>,
    {
        if let Some(existing) = self.entries.get(operation_id) {
            return (Arc::clone(existing.value()), false);
        }

        match self.entries.entry(operation_id.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let record = Arc::new(factory());
                entry.insert(Arc::clone(&record));
                (record, true)
            }
        }
    }

    /// Removes `record` from the registry if it is still the live entry for
    /// `operation_id`. No-op if the id now maps to a different generation.
    ///
    /// The record's deleted flag is set under the same shard lock as the
    /// removal. Returns true if this call removed the record.
    pub fn compare_and_delete(&self, operation_id: &str, record: &Arc<Record<T, E>>) -> bool {
        self.entries
            .remove_if(operation_id, |_, current| {
                Arc::ptr_eq(current, record) && record.mark_deleted()
            })
            .is_some()
    }

    /// Snapshot membership check; may be stale by the time it returns.
    pub fn contains(&self, operation_id: &str) -> bool {
        self.entries.contains_key(operation_id)
    }

    /// Number of live records (pending or cached).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Runs `f` only if `record` has not been removed, excluding concurrent
    /// removal of its id while `f` runs.
    ///
    /// Holds the shard read lock for `operation_id`; `f` must not touch the
    /// registry.
    pub(crate) fn while_live<R>(&self, record: &Record<T, E>, f: impl FnOnce() -> R) -> Option<R> {
        let _guard = self.entries.get(record.operation_id());
        if record.is_deleted() {
            return None;
        }
        Some(f())
    }
}

impl<T, E> Default for Registry<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for Registry<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.len())
            .finish()
    }
}
