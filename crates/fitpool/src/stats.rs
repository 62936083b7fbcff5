//! Cumulative operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a pool's cumulative counters.
///
/// Counters only ever increase. They are updated with relaxed atomics, so
/// a snapshot taken while other threads are active is not a consistent
/// cut across fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Requests served from the arena.
    pub pool_allocations: u64,
    /// Requests served by the system allocator.
    pub fallback_allocations: u64,
    /// Requests refused under `FallbackPolicy::Deny`.
    pub denied_allocations: u64,
    /// Pool allocations released.
    pub pool_frees: u64,
    /// Fallback allocations released.
    pub fallback_frees: u64,
    /// Free blocks split to serve a smaller request.
    pub splits: u64,
    /// Neighbouring free blocks folded together on release.
    pub merges: u64,
    /// Releases rejected as double frees or corrupt headers.
    pub rejected_frees: u64,
}

impl PoolStats {
    /// Pool allocations not yet released.
    pub fn live_pool_allocations(&self) -> u64 {
        self.pool_allocations.saturating_sub(self.pool_frees)
    }

    /// Fallback allocations not yet released.
    pub fn live_fallback_allocations(&self) -> u64 {
        self.fallback_allocations.saturating_sub(self.fallback_frees)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) pool_allocations: AtomicU64,
    pub(crate) fallback_allocations: AtomicU64,
    pub(crate) denied_allocations: AtomicU64,
    pub(crate) pool_frees: AtomicU64,
    pub(crate) fallback_frees: AtomicU64,
    pub(crate) splits: AtomicU64,
    pub(crate) merges: AtomicU64,
    pub(crate) rejected_frees: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub(crate) fn snapshot(&self) -> PoolStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PoolStats {
            pool_allocations: load(&self.pool_allocations),
            fallback_allocations: load(&self.fallback_allocations),
            denied_allocations: load(&self.denied_allocations),
            pool_frees: load(&self.pool_frees),
            fallback_frees: load(&self.fallback_frees),
            splits: load(&self.splits),
            merges: load(&self.merges),
            rejected_frees: load(&self.rejected_frees),
        }
    }
}
