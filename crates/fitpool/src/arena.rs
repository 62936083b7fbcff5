//! The fixed-size backing buffer of a pool.
//!
//! An [`Arena`] is reserved once from the system allocator when the pool is
//! built and returned to it exactly once when the pool is dropped. It is
//! never grown, moved, or reallocated, so every address the pool hands out
//! stays valid until it is released.

#![allow(unsafe_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;

use crate::error::PoolError;

/// A contiguous, uninitialised byte buffer owned by one pool.
pub(crate) struct Arena {
    base: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the arena is a plain heap buffer. Access to its bytes goes through
// raw pointers whose ranges are handed out and reclaimed under the pool lock,
// so sharing the owner between threads cannot create unsynchronised aliasing.
unsafe impl Send for Arena {}
// SAFETY: see `Send` above; `&Arena` only exposes address arithmetic.
unsafe impl Sync for Arena {}

impl Arena {
    /// Reserve `capacity` bytes aligned to `align`.
    pub(crate) fn new(capacity: usize, align: usize) -> Result<Self, PoolError> {
        let layout =
            Layout::from_size_align(capacity, align).map_err(|e| PoolError::InvalidConfig {
                reason: format!("arena layout ({capacity} bytes, align {align}): {e}"),
            })?;
        if layout.size() == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "capacity must be non-zero".into(),
            });
        }
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { System.alloc(layout) };
        let base = NonNull::new(raw).ok_or(PoolError::ArenaAllocation { capacity })?;
        Ok(Self { base, layout })
    }

    /// Total size in bytes.
    pub(crate) fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Address of the first byte.
    pub(crate) fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Whether `addr` falls inside `[base, base + capacity)`.
    pub(crate) fn contains(&self, addr: usize) -> bool {
        self.offset_of(addr).is_some()
    }

    /// Offset of `addr` from the arena base, if it lies inside the arena.
    pub(crate) fn offset_of(&self, addr: usize) -> Option<usize> {
        let offset = addr.checked_sub(self.base())?;
        (offset < self.capacity()).then_some(offset)
    }

    /// Pointer to the byte at `offset`.
    ///
    /// The pointer carries the arena's provenance; `offset` must not exceed
    /// the capacity.
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.capacity(), "offset {offset} past arena end");
        // SAFETY: `offset <= capacity`, so the result stays inside (or one
        // past the end of) the allocation and is therefore non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `base` was returned by `System.alloc(self.layout)` and is
        // released only here.
        unsafe { System.dealloc(self.base.as_ptr(), self.layout) };
    }
}
