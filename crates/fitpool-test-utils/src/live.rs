//! Tracking of outstanding allocations for randomised tests.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use fitpool::{MemoryPool, PoolError};
use indexmap::IndexMap;

use crate::pattern;

/// One outstanding allocation.
#[derive(Clone, Copy, Debug)]
pub struct LiveAlloc {
    pub ptr: NonNull<u8>,
    pub size: usize,
    pub tag: u8,
}

impl LiveAlloc {
    /// Half-open address range of the user bytes.
    pub fn range(&self) -> (usize, usize) {
        let start = self.ptr.as_ptr() as usize;
        (start, start + self.size)
    }
}

/// Outstanding allocations of one pool, in insertion order.
///
/// Every allocation is filled with a tag-derived pattern when it is made
/// and checked again when it is released, so overlap between live ranges
/// is caught at the latest on release. Removal is by position with
/// `swap_remove`, which keeps random-release models O(1).
pub struct LiveSet<'p, const ALIGN: usize> {
    pool: &'p MemoryPool<ALIGN>,
    allocs: IndexMap<usize, LiveAlloc>,
    next_tag: u8,
}

impl<'p, const ALIGN: usize> LiveSet<'p, ALIGN> {
    pub fn new(pool: &'p MemoryPool<ALIGN>) -> Self {
        Self {
            pool,
            allocs: IndexMap::new(),
            next_tag: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.allocs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveAlloc> {
        self.allocs.values()
    }

    /// Allocate `size` bytes, fill them, and track the allocation.
    ///
    /// Returns `None` exactly when the pool does.
    pub fn allocate(&mut self, size: usize) -> Option<LiveAlloc> {
        let ptr = self.pool.allocate(size)?;
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        // SAFETY: the pool just handed out `size` writable bytes at `ptr`.
        unsafe { pattern::fill(ptr, size, tag) };
        let alloc = LiveAlloc { ptr, size, tag };
        let previous = self.allocs.insert(ptr.as_ptr() as usize, alloc);
        assert!(
            previous.is_none(),
            "pool returned {:p} while it was still live",
            ptr
        );
        Some(alloc)
    }

    /// Release the allocation at position `index % len`.
    ///
    /// Panics if its contents were clobbered while it was live. Returns
    /// `None` if the set is empty.
    pub fn release_at(&mut self, index: usize) -> Option<Result<LiveAlloc, PoolError>> {
        if self.allocs.is_empty() {
            return None;
        }
        let (_, alloc) = self.allocs.swap_remove_index(index % self.allocs.len())?;
        self.assert_intact(&alloc);
        // SAFETY: `alloc` came from `self.pool` and was removed from the set,
        // so it is released exactly once.
        Some(unsafe { self.pool.free(alloc.ptr.as_ptr()) }.map(|()| alloc))
    }

    /// Release everything still tracked, oldest first.
    pub fn release_all(&mut self) -> Result<(), PoolError> {
        while !self.allocs.is_empty() {
            if let Some(result) = self.release_at(0) {
                result?;
            }
        }
        Ok(())
    }

    /// Panics if `alloc`'s pattern was overwritten.
    pub fn assert_intact(&self, alloc: &LiveAlloc) {
        // SAFETY: `alloc` is live, so its bytes are readable.
        let mismatch = unsafe { pattern::first_mismatch(alloc.ptr, alloc.size, alloc.tag) };
        assert_eq!(
            mismatch, None,
            "allocation {:p} ({} bytes) clobbered",
            alloc.ptr, alloc.size
        );
    }

    /// Panics if any live allocation was overwritten.
    pub fn assert_all_intact(&self) {
        for alloc in self.allocs.values() {
            self.assert_intact(alloc);
        }
    }

    /// Panics if two live ranges overlap.
    pub fn assert_disjoint(&self) {
        let mut ranges: Vec<(usize, usize)> = self.allocs.values().map(LiveAlloc::range).collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(
                pair[0].1 <= pair[1].0,
                "live ranges overlap: {:#x}..{:#x} and {:#x}..{:#x}",
                pair[0].0,
                pair[0].1,
                pair[1].0,
                pair[1].1
            );
        }
    }

    /// Arena bytes the tracked pool allocations should occupy.
    pub fn pooled_bytes(&self) -> usize {
        self.allocs
            .values()
            .filter(|a| self.pool.owns(a.ptr.as_ptr()))
            .map(|a| a.size + self.pool.overhead())
            .sum()
    }
}
