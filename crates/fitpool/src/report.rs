//! Read-only occupancy and fragmentation snapshots.
//!
//! Both types are taken under the pool lock, so each one describes a
//! single consistent state of the block table.

use std::fmt;

/// Occupancy summary of one pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolReport {
    /// Arena size in bytes.
    pub capacity: usize,
    /// Bytes held by used blocks, bookkeeping overhead included.
    pub used_bytes: usize,
    /// Size of the largest free block. A low value next to a low
    /// occupancy means the free space is fragmented.
    pub largest_free: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Number of used blocks (live pool allocations).
    pub used_blocks: usize,
}

impl PoolReport {
    /// Fraction of the arena in use, in `[0, 1]`.
    pub fn occupancy(&self) -> f64 {
        self.used_bytes as f64 / self.capacity as f64
    }

    /// Largest free block as a fraction of the arena, in `[0, 1]`.
    pub fn largest_free_fraction(&self) -> f64 {
        self.largest_free as f64 / self.capacity as f64
    }

    /// Bytes not held by any used block.
    pub fn free_bytes(&self) -> usize {
        self.capacity - self.used_bytes
    }
}

/// Percent with one decimal, rounded half away from zero.
fn percent(fraction: f64) -> f64 {
    (fraction * 1000.0).round() / 10.0
}

impl fmt::Display for PoolReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocated={:.1}%  largest_free={:.1}%",
            percent(self.occupancy()),
            percent(self.largest_free_fraction()),
        )
    }
}

/// One block of the physical list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSpan {
    /// Start offset within the arena.
    pub offset: usize,
    /// Size in bytes.
    pub size: usize,
    /// Whether the block is free.
    pub free: bool,
}

/// Address-ordered snapshot of every block in the arena.
///
/// `Display` draws one glyph per block between bars: `#` for used, a
/// space for free.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockMap {
    spans: Vec<BlockSpan>,
}

impl BlockMap {
    pub(crate) fn new(spans: Vec<BlockSpan>) -> Self {
        Self { spans }
    }

    /// The blocks in address order.
    pub fn spans(&self) -> &[BlockSpan] {
        &self.spans
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the map holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

impl fmt::Display for BlockMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("|")?;
        for span in &self.spans {
            f.write_str(if span.free { " " } else { "#" })?;
        }
        f.write_str("|")
    }
}
