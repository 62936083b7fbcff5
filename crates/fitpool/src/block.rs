//! Block descriptors and the address-ordered block table.
//!
//! The arena is covered by a doubly linked list of [`Block`]s in address
//! order. Descriptors live in a pool that only grows; retired descriptors
//! are recycled last-in-first-out so split/merge churn does not allocate.
//!
//! ```text
//!  head (size 0, used)
//!    │
//!    ▼
//!  ┌────────┬──────────────┬──────┬────────────────────────┐
//!  │ used   │ free         │ used │ free                   │  arena
//!  └────────┴──────────────┴──────┴────────────────────────┘
//!  offset 0                                          capacity
//! ```

use std::fmt;

/// Stable handle to a block descriptor.
///
/// Id 0 is reserved as "no block" and is never issued. The raw value is
/// what pool allocations store in their owner word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// The reserved "no block" id.
    pub const NONE: BlockId = BlockId(0);

    /// Rebuild an id from its raw value.
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The raw value stored in allocation headers.
    pub fn get(self) -> usize {
        self.0
    }

    /// Whether this is the reserved "no block" id.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    fn slot(self) -> usize {
        debug_assert!(!self.is_none(), "BlockId::NONE has no descriptor");
        self.0 - 1
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One contiguous region of the arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Block {
    pub(crate) free: bool,
    pub(crate) size: usize,
    pub(crate) offset: usize,
    pub(crate) prev: BlockId,
    pub(crate) next: BlockId,
}

impl Block {
    /// One past the last byte of this block.
    pub(crate) fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Descriptor pool plus the physical list threaded through it.
///
/// Guarantees, assuming only the public methods are used:
///
/// 1. The list starting at [`head`](Self::head) is sorted by offset and
///    covers `[0, capacity)` without gaps or overlaps.
/// 2. The head is a zero-size, never-free sentinel at offset 0.
pub(crate) struct BlockTable {
    blocks: Vec<Block>,
    /// Retired ids, reused LIFO.
    recycled: Vec<BlockId>,
    head: BlockId,
}

impl BlockTable {
    /// Build the initial table: the sentinel followed by one free block
    /// spanning the whole arena. Returns the table and the free block's id.
    pub(crate) fn new(capacity: usize) -> (Self, BlockId) {
        let mut table = Self {
            blocks: Vec::with_capacity(16),
            recycled: Vec::new(),
            head: BlockId::NONE,
        };
        let head = table.new_block();
        let first = table.new_block();
        *table.get_mut(head) = Block {
            free: false,
            size: 0,
            offset: 0,
            prev: BlockId::NONE,
            next: first,
        };
        *table.get_mut(first) = Block {
            free: true,
            size: capacity,
            offset: 0,
            prev: head,
            next: BlockId::NONE,
        };
        table.head = head;
        (table, first)
    }

    /// Issue a fresh or recycled descriptor, cleared to its default state.
    pub(crate) fn new_block(&mut self) -> BlockId {
        if let Some(id) = self.recycled.pop() {
            return id;
        }
        self.blocks.push(Block::default());
        BlockId(self.blocks.len())
    }

    /// Clear a descriptor and return its id to the recycle stack.
    ///
    /// The caller must already have unlinked it from the physical list.
    pub(crate) fn delete_block(&mut self, id: BlockId) {
        debug_assert!(id != self.head, "the head sentinel is never deleted");
        *self.get_mut(id) = Block::default();
        self.recycled.push(id);
    }

    /// The sentinel preceding the first real block.
    pub(crate) fn head(&self) -> BlockId {
        self.head
    }

    /// Whether `id` lies inside the descriptor pool (issued or recycled).
    pub(crate) fn in_range(&self, id: BlockId) -> bool {
        !id.is_none() && id.0 <= self.blocks.len()
    }

    pub(crate) fn get(&self, id: BlockId) -> &Block {
        &self.blocks[id.slot()]
    }

    pub(crate) fn get_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.slot()]
    }

    /// Total descriptors ever issued (the pool never shrinks).
    pub(crate) fn descriptor_count(&self) -> usize {
        self.blocks.len()
    }

    /// Descriptors waiting on the recycle stack.
    pub(crate) fn recycled_count(&self) -> usize {
        self.recycled.len()
    }

    /// Real blocks in address order, skipping the sentinel.
    pub(crate) fn iter(&self) -> Blocks<'_> {
        Blocks {
            table: self,
            cursor: self.get(self.head).next,
        }
    }

    /// Shrink `id` to `size` bytes and link a new block covering the rest.
    ///
    /// The new block inherits `id`'s free flag; the caller decides the
    /// final state of both. Returns the new block's id.
    pub(crate) fn split(&mut self, id: BlockId, size: usize) -> BlockId {
        let rest = self.new_block();
        let block = *self.get(id);
        debug_assert!(size < block.size, "split must leave a non-empty remainder");

        *self.get_mut(rest) = Block {
            free: block.free,
            size: block.size - size,
            offset: block.offset + size,
            prev: id,
            next: block.next,
        };
        if !block.next.is_none() {
            self.get_mut(block.next).prev = rest;
        }
        let block = self.get_mut(id);
        block.size = size;
        block.next = rest;
        rest
    }

    /// Fold `id`'s successor into `id` and retire the successor.
    pub(crate) fn absorb_next(&mut self, id: BlockId) {
        let next_id = self.get(id).next;
        let next = *self.get(next_id);
        let block = self.get_mut(id);
        block.size += next.size;
        block.next = next.next;
        if !next.next.is_none() {
            self.get_mut(next.next).prev = id;
        }
        self.delete_block(next_id);
    }

    /// Fold `id`'s predecessor into `id` and retire the predecessor.
    ///
    /// `id` takes over the predecessor's start offset.
    pub(crate) fn absorb_prev(&mut self, id: BlockId) {
        let prev_id = self.get(id).prev;
        let prev = *self.get(prev_id);
        let block = self.get_mut(id);
        block.size += prev.size;
        block.offset = prev.offset;
        block.prev = prev.prev;
        if !prev.prev.is_none() {
            self.get_mut(prev.prev).next = id;
        }
        self.delete_block(prev_id);
    }
}

/// Address-order iterator over real blocks.
pub(crate) struct Blocks<'a> {
    table: &'a BlockTable,
    cursor: BlockId,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = (BlockId, &'a Block);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_none() {
            return None;
        }
        let id = self.cursor;
        let block = self.table.get(id);
        self.cursor = block.next;
        Some((id, block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(table: &BlockTable) -> Vec<(usize, usize, bool)> {
        table
            .iter()
            .map(|(_, b)| (b.offset, b.size, b.free))
            .collect()
    }

    #[test]
    fn new_table_has_sentinel_and_one_free_block() {
        let (table, first) = BlockTable::new(1024);
        let head = table.get(table.head());
        assert_eq!(head.size, 0);
        assert!(!head.free);
        assert_eq!(head.next, first);
        assert_eq!(spans(&table), vec![(0, 1024, true)]);
    }

    #[test]
    fn id_zero_is_never_issued() {
        let (mut table, _) = BlockTable::new(64);
        for _ in 0..10 {
            assert!(!table.new_block().is_none());
        }
    }

    #[test]
    fn deleted_ids_are_recycled_lifo() {
        let (mut table, _) = BlockTable::new(64);
        let a = table.new_block();
        let b = table.new_block();
        table.delete_block(a);
        table.delete_block(b);
        assert_eq!(table.recycled_count(), 2);
        assert_eq!(table.new_block(), b);
        assert_eq!(table.new_block(), a);
        assert_eq!(table.recycled_count(), 0);
    }

    #[test]
    fn delete_clears_descriptor() {
        let (mut table, first) = BlockTable::new(64);
        let rest = table.split(first, 16);
        table.get_mut(rest).free = true;
        table.absorb_next(first);
        assert_eq!(*table.get(rest), Block::default());
        assert!(table.in_range(rest));
    }

    #[test]
    fn split_keeps_list_contiguous() {
        let (mut table, first) = BlockTable::new(1000);
        table.get_mut(first).free = false;
        let rest = table.split(first, 300);
        table.get_mut(rest).free = true;
        let tail = table.split(rest, 200);
        assert_eq!(
            spans(&table),
            vec![(0, 300, false), (300, 200, true), (500, 500, true)]
        );
        assert_eq!(table.get(tail).prev, rest);
        assert_eq!(table.get(rest).next, tail);
    }

    #[test]
    fn absorb_prev_takes_over_offset() {
        let (mut table, first) = BlockTable::new(1000);
        let mid = table.split(first, 100);
        let tail = table.split(mid, 400);
        table.absorb_prev(mid);
        assert_eq!(spans(&table).len(), 2);
        let merged = table.get(mid);
        assert_eq!(merged.offset, 0);
        assert_eq!(merged.size, 500);
        assert_eq!(merged.prev, table.head());
        assert_eq!(table.get(table.head()).next, mid);
        assert_eq!(table.get(tail).prev, mid);
    }

    #[test]
    fn absorb_next_relinks_successor() {
        let (mut table, first) = BlockTable::new(1000);
        let mid = table.split(first, 100);
        let tail = table.split(mid, 400);
        table.absorb_next(first);
        assert_eq!(spans(&table).len(), 2);
        assert_eq!(table.get(first).size, 500);
        assert_eq!(table.get(first).next, tail);
        assert_eq!(table.get(tail).prev, first);
    }

    #[test]
    fn iteration_spans_capacity() {
        let (mut table, first) = BlockTable::new(4096);
        let mut cursor = first;
        for _ in 0..8 {
            cursor = table.split(cursor, 128);
        }
        let total: usize = table.iter().map(|(_, b)| b.size).sum();
        assert_eq!(total, 4096);
        let mut expected = 0;
        for (_, b) in table.iter() {
            assert_eq!(b.offset, expected);
            expected = b.end();
        }
    }
}
