//! Size-ordered index of free blocks for best-fit search.
//!
//! Entries are `(size, id)` pairs. The key is recomputed from the block
//! descriptor whenever an entry is removed, so descriptors never cache a
//! position inside the index.

use std::collections::BTreeSet;

use crate::block::BlockId;

/// Best-fit lookup over the currently free blocks.
///
/// Holds exactly one entry per free block. Several blocks of the same
/// size are distinct entries, ordered by id.
#[derive(Debug, Default)]
pub(crate) struct FreeIndex {
    entries: BTreeSet<(usize, BlockId)>,
}

impl FreeIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record that block `id` of `size` bytes is free.
    pub(crate) fn insert(&mut self, size: usize, id: BlockId) {
        let fresh = self.entries.insert((size, id));
        debug_assert!(fresh, "block {id} already indexed at size {size}");
    }

    /// Drop the entry for block `id` of `size` bytes.
    ///
    /// Returns whether the entry was present.
    pub(crate) fn remove(&mut self, size: usize, id: BlockId) -> bool {
        let found = self.entries.remove(&(size, id));
        debug_assert!(found, "block {id} missing from index at size {size}");
        found
    }

    /// The smallest free block of at least `size` bytes.
    ///
    /// Among equal sizes the lowest id wins; callers must not rely on that.
    pub(crate) fn best_fit(&self, size: usize) -> Option<(usize, BlockId)> {
        self.entries.range((size, BlockId::NONE)..).next().copied()
    }

    /// Whether the exact entry is present.
    pub(crate) fn contains(&self, size: usize, id: BlockId) -> bool {
        self.entries.contains(&(size, id))
    }

    /// Size of the largest free block, or 0 when nothing is free.
    pub(crate) fn largest(&self) -> usize {
        self.entries.last().map_or(0, |&(size, _)| size)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in ascending `(size, id)` order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, BlockId)> + '_ {
        self.entries.iter().copied()
    }
}
