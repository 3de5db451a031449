//! ID Allocation
//!
//! Lock-free, strictly increasing ID source. One allocator exists per
//! entity kind (files, parts); there is no ordering between kinds.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StoreError};

/// Thread-safe monotonically increasing ID source
///
/// The counter is never exposed; callers only see values returned by
/// [`IdAllocator::next`].
#[derive(Debug)]
pub struct IdAllocator {
    /// Entity kind, used in the exhaustion error
    kind: &'static str,
    /// Next value to hand out
    next: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator whose first ID is 1
    pub fn new(kind: &'static str) -> Self {
        Self::starting_at(kind, 1)
    }

    /// Create an allocator whose first ID is `first`
    pub fn starting_at(kind: &'static str, first: u64) -> Self {
        Self {
            kind,
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next ID
    ///
    /// Linearizable across threads: every value is strictly greater than all
    /// values previously returned by this allocator. Running out of `u64`
    /// space is reported as [`StoreError::IdExhausted`] instead of wrapping.
    pub fn next(&self) -> Result<u64> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(1)
            })
            .map_err(|_| StoreError::IdExhausted { kind: self.kind })
    }

    /// The value the next call to `next()` would return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
