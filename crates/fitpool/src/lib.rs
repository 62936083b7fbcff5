//! Fixed-capacity, thread-safe best-fit memory pool.
//!
//! A [`MemoryPool`] reserves one arena up front and hands out byte ranges
//! from it, choosing the smallest free block that fits and merging
//! neighbouring free blocks on release. It targets workloads dominated by
//! many small, short-lived allocations. Requests the arena cannot serve
//! fall back to the system allocator.
//!
//! # Architecture
//!
//! ```text
//! MemoryPool<ALIGN> (front-end: allocate / free / report)
//! ├── Arena (fixed byte buffer, reserved once)
//! ├── Mutex<PoolState>
//! │   ├── BlockTable (address-ordered block list + descriptor recycling)
//! │   └── FreeIndex  ((size, id) set for best-fit search)
//! ├── Header (owner word + shift tag hidden before each user pointer)
//! └── fallback (system allocator, same header layout)
//! ```
//!
//! # Safety boundary
//!
//! The crate denies `unsafe` except in `arena`, `header`, `fallback` and
//! `pool`, which own the raw-pointer arithmetic. Block handles are plain
//! indices; no descriptor reference ever lives inside user memory.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod arena;
pub mod block;
pub mod config;
pub mod error;
mod fallback;
mod free_index;
pub mod header;
pub mod pool;
pub mod report;
pub mod stats;

// Public re-exports for the primary API surface.
pub use block::BlockId;
pub use config::{FallbackPolicy, PoolConfig};
pub use error::PoolError;
pub use header::MAX_ALIGN;
pub use pool::{MemoryPool, DEFAULT_ALIGN};
pub use report::{BlockMap, BlockSpan, PoolReport};
pub use stats::PoolStats;
