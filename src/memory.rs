//! Allocator handles.
//!
//! Every halftone structure records which [`Memory`] it was allocated from.
//! Installing a candidate built in the same memory moves its arrays; a
//! candidate from another memory is cloned. All array allocations go
//! through [`Memory::alloc_vec`] so that a failure surfaces as
//! `OutOfMemory` instead of aborting the process.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{HalftoneError, Result};

/// Identity of a [`Memory`]; two structures share an allocator iff their ids
/// are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryId(u64);

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Reserve `count` consecutive object ids and return the first.
///
/// Ids identify halftone sets and rendered tiles to downstream caches, so
/// they are unique across all memories.
pub fn next_ids(count: u64) -> u64 {
    NEXT_OBJECT_ID.fetch_add(count.max(1), Ordering::Relaxed)
}

#[derive(Debug)]
pub struct Memory {
    id: MemoryId,
    fail_after: Cell<Option<usize>>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            id: MemoryId(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed)),
            fail_after: Cell::new(None),
        }
    }

    pub fn id(&self) -> MemoryId {
        self.id
    }

    /// Let `successes` more allocations succeed, then fail the next one.
    ///
    /// The injected failure fires once; later allocations succeed again.
    pub fn fail_after(&self, successes: usize) {
        self.fail_after.set(Some(successes));
    }

    pub fn clear_faults(&self) {
        self.fail_after.set(None);
    }

    fn check_fault(&self, what: &'static str, requested: usize) -> Result<()> {
        match self.fail_after.get() {
            Some(0) => {
                self.fail_after.set(None);
                tracing::debug!(what, requested, "Injected allocation failure");
                Err(HalftoneError::OutOfMemory { what, requested })
            }
            Some(n) => {
                self.fail_after.set(Some(n - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Allocate a vector of `len` copies of `fill`.
    pub fn alloc_vec<T: Clone>(&self, len: usize, fill: T, what: &'static str) -> Result<Vec<T>> {
        self.check_fault(what, len)?;
        let mut v = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| HalftoneError::OutOfMemory { what, requested: len })?;
        v.resize(len, fill);
        Ok(v)
    }

    /// Allocate a copy of `src`.
    pub fn alloc_copy<T: Copy>(&self, src: &[T], what: &'static str) -> Result<Vec<T>> {
        self.check_fault(what, src.len())?;
        let mut v = Vec::new();
        v.try_reserve_exact(src.len())
            .map_err(|_| HalftoneError::OutOfMemory {
                what,
                requested: src.len(),
            })?;
        v.extend_from_slice(src);
        Ok(v)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
