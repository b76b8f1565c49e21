//! Striped mutex table for multi-step read-modify-write sequences
//!
//! The store makes a single batch atomic, but a collection command reads
//! the root record, reads or alters members, then commits one batch. Those
//! steps must run under a lock keyed by the collection id.
//!
//! Keys hash (xxh3) onto a fixed table of mutexes, so memory is constant and
//! there is no per-key bookkeeping. Two keys sharing a slot serialize with
//! each other.
//!
//! # Deadlock freedom
//!
//! [`HashLock::lock_all`] deduplicates slots and acquires them in ascending
//! slot order, so any two multi-key acquisitions agree on lock order.

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

/// Default number of slots.
pub const DEFAULT_HASHLOCK_SIZE: usize = 1_000_000;

/// A fixed-size table of mutexes addressed by key hash.
pub struct HashLock {
    slots: Vec<Mutex<()>>,
}

/// Holds one or more slots of a [`HashLock`] until dropped.
#[must_use = "the slots are released as soon as the guard is dropped"]
pub struct HashLockGuard<'a> {
    _guards: SmallVec<[MutexGuard<'a, ()>; 4]>,
}

impl HashLock {
    /// A table with `size` slots (at least one).
    pub fn new(size: usize) -> Self {
        let slots = (0..size.max(1)).map(|_| Mutex::new(())).collect();
        Self { slots }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &[u8]) -> usize {
        (xxh3_64(key) % self.slots.len() as u64) as usize
    }

    /// Lock the slot of `key`.
    pub fn lock(&self, key: &[u8]) -> HashLockGuard<'_> {
        let mut guards = SmallVec::new();
        guards.push(self.slots[self.slot(key)].lock());
        HashLockGuard { _guards: guards }
    }

    /// Lock the slots of every key in `keys` as one critical section.
    pub fn lock_all<K: AsRef<[u8]>>(&self, keys: &[K]) -> HashLockGuard<'_> {
        let mut slots: SmallVec<[usize; 8]> =
            keys.iter().map(|k| self.slot(k.as_ref())).collect();
        slots.sort_unstable();
        slots.dedup();
        let guards = slots.into_iter().map(|i| self.slots[i].lock()).collect();
        HashLockGuard { _guards: guards }
    }
}

impl Default for HashLock {
    fn default() -> Self {
        Self::new(DEFAULT_HASHLOCK_SIZE)
    }
}
