//! Workload profiles and replay drivers for benchmarking fitpool.
//!
//! A [`Workload`] is a deterministic allocate/release trace: a stream of
//! request sizes drawn from a seeded ChaCha8 generator plus a live window
//! that bounds how many allocations are outstanding at once. The same
//! trace can be replayed against a [`MemoryPool`] ([`replay_pool`]) or the
//! global allocator ([`replay_system`]) so the two are directly comparable.
//!
//! - [`small_objects`]: many 8..128 byte requests, short lifetimes
//! - [`mixed`]: 16..4096 byte requests, longer lifetimes
//! - [`overflow`]: live set larger than the arena, exercises fallback

#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use fitpool::{MemoryPool, PoolError};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A replayable allocation trace.
#[derive(Clone, Debug)]
pub struct Workload {
    /// Short label used as the benchmark id.
    pub name: &'static str,
    /// Request sizes in issue order.
    pub sizes: Vec<usize>,
    /// Maximum number of outstanding allocations. Once reached, the
    /// oldest-by-slot allocation is released before the next request.
    pub live_window: usize,
    /// Arena capacity the trace is meant to run against.
    pub capacity: usize,
}

/// Draw `n` sizes uniformly from `min..=max` with a seeded ChaCha8 RNG.
pub fn size_stream(seed: u64, n: usize, min: usize, max: usize) -> Vec<usize> {
    assert!(min >= 1 && min <= max, "invalid size range {min}..={max}");
    let span = (max - min + 1) as u64;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| min + (rng.next_u64() % span) as usize)
        .collect()
}

/// Many tiny, short-lived objects in a 1 MiB arena.
pub fn small_objects(seed: u64) -> Workload {
    Workload {
        name: "small_objects",
        sizes: size_stream(seed, 10_000, 8, 128),
        live_window: 64,
        capacity: 1 << 20,
    }
}

/// A wider size spread with a larger live set in a 4 MiB arena.
pub fn mixed(seed: u64) -> Workload {
    Workload {
        name: "mixed",
        sizes: size_stream(seed, 10_000, 16, 4096),
        live_window: 256,
        capacity: 4 << 20,
    }
}

/// A live set that outgrows a 64 KiB arena, so part of the trace is
/// served by the fallback path.
pub fn overflow(seed: u64) -> Workload {
    Workload {
        name: "overflow",
        sizes: size_stream(seed, 10_000, 64, 1024),
        live_window: 256,
        capacity: 64 << 10,
    }
}

/// All profiles, in benchmark order.
pub fn profiles(seed: u64) -> Vec<Workload> {
    vec![small_objects(seed), mixed(seed), overflow(seed)]
}

/// Replay `workload` against `pool`. Returns the number of requests the
/// pool served from its arena.
///
/// Every allocation is released before returning, so the pool is back to
/// a single free block afterwards. A release the pool rejects aborts the
/// replay with that error.
#[allow(unsafe_code)]
pub fn replay_pool<const ALIGN: usize>(
    pool: &MemoryPool<ALIGN>,
    workload: &Workload,
) -> Result<usize, PoolError> {
    let mut live: Vec<*mut u8> = Vec::with_capacity(workload.live_window);
    let mut pooled = 0;
    for (i, &size) in workload.sizes.iter().enumerate() {
        if live.len() == workload.live_window {
            let victim = live.swap_remove(i % live.len());
            // SAFETY: `victim` came from `pool` and was removed from `live`.
            unsafe { pool.free(victim)? };
        }
        if let Some(p) = pool.allocate(size) {
            pooled += usize::from(pool.owns(p.as_ptr()));
            live.push(p.as_ptr());
        }
    }
    // SAFETY: `live` holds only pointers from `pool` that are still live.
    unsafe { release_all(pool, live)? };
    Ok(pooled)
}

/// Release `ptrs` in order, stopping at the first release the pool rejects.
///
/// # Safety
///
/// Every pointer must satisfy the contract of [`MemoryPool::free`] on
/// `pool`.
#[allow(unsafe_code)]
pub unsafe fn release_all<const ALIGN: usize>(
    pool: &MemoryPool<ALIGN>,
    ptrs: impl IntoIterator<Item = *mut u8>,
) -> Result<(), PoolError> {
    for p in ptrs {
        // SAFETY: forwarded from the caller.
        unsafe { pool.free(p)? };
    }
    Ok(())
}

/// Replay `workload` against the global allocator with the same release
/// order as [`replay_pool`]. Returns the number of requests served.
pub fn replay_system(workload: &Workload) -> usize {
    let mut live: Vec<Vec<u8>> = Vec::with_capacity(workload.live_window);
    let mut served = 0;
    for (i, &size) in workload.sizes.iter().enumerate() {
        if live.len() == workload.live_window {
            let n = live.len();
            drop(live.swap_remove(i % n));
        }
        live.push(Vec::with_capacity(size));
        served += 1;
    }
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_stream_is_deterministic_and_in_range() {
        let a = size_stream(42, 1000, 8, 128);
        let b = size_stream(42, 1000, 8, 128);
        assert_eq!(a, b);
        assert!(a.iter().all(|&s| (8..=128).contains(&s)));
        assert_ne!(a, size_stream(43, 1000, 8, 128));
    }

    #[test]
    fn replay_leaves_pool_empty() {
        for workload in profiles(7) {
            let pool = MemoryPool::<64>::with_capacity(workload.capacity).unwrap();
            let pooled = replay_pool(&pool, &workload).unwrap();
            assert!(pooled > 0, "{}: nothing served from the arena", workload.name);
            pool.check().unwrap();
            assert_eq!(pool.report().used_bytes, 0);
            assert_eq!(pool.block_map().len(), 1);
        }
    }

    #[test]
    fn overflow_profile_reaches_fallback() {
        let workload = overflow(7);
        let pool = MemoryPool::<64>::with_capacity(workload.capacity).unwrap();
        let pooled = replay_pool(&pool, &workload).unwrap();
        assert!(pooled < workload.sizes.len());
        assert!(pool.stats().fallback_allocations > 0);
    }

    #[test]
    #[allow(unsafe_code)]
    fn release_all_stops_at_rejected_free() {
        let pool = MemoryPool::<64>::with_capacity(4096).unwrap();
        let a = pool.allocate(32).unwrap().as_ptr();
        let b = pool.allocate(32).unwrap().as_ptr();
        let err = unsafe { release_all(&pool, [a, a, b]) }.unwrap_err();
        assert_eq!(err, PoolError::DoubleFree { offset: 0 });
        assert_eq!(pool.stats().pool_frees, 1);
        unsafe { release_all(&pool, [b]).unwrap() };
        assert_eq!(pool.block_map().len(), 1);
    }

    #[test]
    fn system_replay_serves_everything() {
        let workload = small_objects(1);
        assert_eq!(replay_system(&workload), workload.sizes.len());
    }
}
