//! Per-uuid mutual exclusion for ingestion.
//!
//! Two uploads of the same plugin must not interleave their directory swap
//! and registry upsert. Uploads of different plugins proceed in parallel.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Set of uuids currently being ingested.
#[derive(Debug, Default)]
pub struct UuidLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl UuidLocks {
    /// Creates an empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `uuid` is free, then claims it.
    pub fn acquire(&self, uuid: &str) -> UuidGuard<'_> {
        let mut held = self.held();
        while held.contains(uuid) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(uuid.to_owned());
        UuidGuard {
            locks: self,
            uuid: uuid.to_owned(),
        }
    }

    /// Claims `uuid` only if nobody holds it.
    pub fn try_acquire(&self, uuid: &str) -> Option<UuidGuard<'_>> {
        let mut held = self.held();
        if !held.insert(uuid.to_owned()) {
            return None;
        }
        Some(UuidGuard {
            locks: self,
            uuid: uuid.to_owned(),
        })
    }

    /// Reports whether `uuid` is currently claimed.
    #[must_use]
    pub fn is_held(&self, uuid: &str) -> bool {
        self.held().contains(uuid)
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set is only mutated by insert/remove, so a poisoned guard still
        // holds a consistent value.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its uuid when dropped.
#[derive(Debug)]
#[must_use = "the uuid is released as soon as the guard is dropped"]
pub struct UuidGuard<'a> {
    locks: &'a UuidLocks,
    uuid: String,
}

impl Drop for UuidGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.uuid);
        self.locks.released.notify_all();
    }
}
