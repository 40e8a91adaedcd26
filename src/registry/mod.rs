//! Block address bookkeeping
//!
//! The registry remembers, for every block address a writer has hit, which
//! pool payload was recorded there last, plus a running count of successful
//! writes.
//!
//! # Last registry update, not last physical write
//!
//! `record_write` runs after the device write returns. When two writers pick
//! the same address at the same time, the order of their registry updates is
//! independent of the order in which the device applied their writes. The
//! surviving identifier is the last *registry update*, which may not be the
//! block's physical content, and the check phase can then report a mismatch
//! that is not real corruption. Fixing that would need per-address locking
//! around the device write, which would serialise exactly the colliding
//! writes this tool exists to generate, so the race is kept.
//!
//! # Example
//!
//! ```
//! use blockstress::registry::BlockRegistry;
//! # use blockstress::pool::RandomPool;
//! # let pool = RandomPool::with_size(std::io::Cursor::new(vec![0u8; 8192]), 8192).unwrap();
//! # let (id, _) = pool.issue();
//!
//! let registry = BlockRegistry::new();
//! registry.record_write(10, id);
//! registry.record_write(10, id);
//! assert_eq!(registry.write_count(), 2);
//! assert_eq!(registry.distinct_address_count(), 1);
//! ```

use crate::pool::RandomId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Cache-line aligned atomic counter
///
/// Every writer bumps the write counter; keeping it on its own cache line
/// stops it from bouncing together with the map mutex.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct AlignedCounter {
    value: AtomicU64,
}

impl AlignedCounter {
    /// Create a new counter with initial value 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter by one
    ///
    /// Relaxed ordering: readers only need an eventually consistent total.
    #[inline]
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value of the counter
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Concurrent map from block address to the payload last recorded there
#[derive(Debug, Default)]
pub struct BlockRegistry {
    written: AlignedCounter,
    blocks: Mutex<HashMap<u64, RandomId>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fully successful write of `id` at `address`
    ///
    /// The counter is bumped first, then the map entry is replaced. Only the
    /// map assignment is under the lock.
    #[inline]
    pub fn record_write(&self, address: u64, id: RandomId) {
        self.written.increment();
        self.lock().insert(address, id);
    }

    /// Total number of `record_write` calls so far
    pub fn write_count(&self) -> u64 {
        self.written.get()
    }

    /// Number of distinct addresses with an entry
    pub fn distinct_address_count(&self) -> usize {
        self.lock().len()
    }

    /// Payload currently recorded for `address`
    pub fn get(&self, address: u64) -> Option<RandomId> {
        self.lock().get(&address).copied()
    }

    /// Visit every entry, in unspecified order
    ///
    /// The map lock is held for the whole walk, so a concurrent
    /// `record_write` blocks until `visit` has seen every entry.
    pub fn for_each<F: FnMut(u64, RandomId)>(&self, mut visit: F) {
        for (&address, &id) in self.lock().iter() {
            visit(address, id);
        }
    }

    /// Visit every entry in place until `visit` fails
    ///
    /// Meant for the check phase, once writers are gone. Holds the map lock
    /// for the whole walk, like `for_each`, and returns the first error
    /// `visit` produces.
    pub fn try_for_each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(u64, RandomId) -> Result<(), E>,
    {
        for (&address, &id) in self.lock().iter() {
            visit(address, id)?;
        }
        Ok(())
    }

    /// Copy of every entry, in unspecified order
    ///
    /// Allocates one element per distinct address; prefer `try_for_each` for
    /// full walks of a large registry.
    pub fn snapshot(&self) -> Vec<(u64, RandomId)> {
        let mut entries = Vec::with_capacity(self.distinct_address_count());
        self.for_each(|address, id| entries.push((address, id)));
        entries
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, RandomId>> {
        // A writer cannot panic while holding the lock (the critical section
        // is a single insert), so a poisoned map is still consistent.
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
