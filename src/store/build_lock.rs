//! Per-key build locks
//!
//! Two requests for the same rank root would otherwise both build and both
//! write the same blob. [`BuildLocks`] serializes builds per key so the second
//! caller waits and then finds the first caller's result in the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::store::cache::BlobKey;

/// Table of in-flight build locks, one per `(morton, level)`.
///
/// Slots are created on demand and dropped once no caller holds them, so
/// the table only grows with the number of concurrent builds.
#[derive(Default)]
pub struct BuildLocks {
    slots: Mutex<HashMap<BlobKey, Arc<Mutex<()>>>>,
}

impl BuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// Locks for distinct keys are independent. A panic inside `f` does not
    /// poison the key for later callers.
    pub fn with_lock<T>(&self, key: BlobKey, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };

        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table and this caller still hold the slot
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&key);
        }
        result
    }

    /// Number of keys currently locked or waited on
    pub fn in_flight(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
