//! The allocator front-end.
//!
//! [`MemoryPool`] carves allocations out of one fixed arena with a best-fit
//! policy, coalesces neighbours on release, and hands requests it cannot
//! serve to the system allocator.
//!
//! # Locking
//!
//! One mutex per pool guards the block table, the free index and the owner
//! words of pool allocations. Placing the aligned user pointer (and reading
//! it back in `free`) touches only memory the caller already owns and runs
//! outside the lock.

#![allow(unsafe_code)]

use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::arena::Arena;
use crate::block::{BlockId, BlockTable};
use crate::config::{FallbackPolicy, PoolConfig};
use crate::error::PoolError;
use crate::fallback;
use crate::free_index::FreeIndex;
use crate::header::{self, Header, MAX_ALIGN, WORD};
use crate::report::{BlockMap, BlockSpan, PoolReport};
use crate::stats::{bump, Counters, PoolStats};

/// Alignment of pointers returned by a pool unless chosen otherwise.
pub const DEFAULT_ALIGN: usize = 64;

/// Structural state guarded by the pool lock.
struct PoolState {
    blocks: BlockTable,
    index: FreeIndex,
}

/// A fixed-capacity, thread-safe best-fit memory pool.
///
/// Every pointer returned by [`allocate`](Self::allocate) is aligned to
/// `ALIGN`, which must be a power of two no larger than
/// [`MAX_ALIGN`]; an invalid `ALIGN` fails to compile.
///
/// The pool never reports exhaustion. A request that no free block can hold
/// is served by the system allocator (see [`FallbackPolicy`]) and released
/// through the same [`free`](Self::free) call.
///
/// # Example
///
/// ```
/// use fitpool::MemoryPool;
///
/// let pool: MemoryPool = MemoryPool::with_capacity(4096).unwrap();
/// let p = pool.allocate(100).unwrap();
/// assert!(pool.owns(p.as_ptr()));
/// // SAFETY: `p` came from this pool and is released once.
/// unsafe { pool.free(p.as_ptr()).unwrap() };
/// assert_eq!(pool.report().used_bytes, 0);
/// ```
pub struct MemoryPool<const ALIGN: usize = DEFAULT_ALIGN> {
    arena: Arena,
    config: PoolConfig,
    state: Mutex<PoolState>,
    counters: Counters,
}

impl<const ALIGN: usize> MemoryPool<ALIGN> {
    const ALIGN_OK: () = assert!(
        ALIGN.is_power_of_two() && ALIGN <= MAX_ALIGN,
        "pool alignment must be a power of two no larger than MAX_ALIGN"
    );

    /// Bookkeeping bytes carved from the arena on top of every request.
    pub const OVERHEAD: usize = header::overhead(ALIGN);

    /// Build a pool from a validated configuration.
    ///
    /// Reserves the whole arena up front.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        #[allow(clippy::let_unit_value)]
        let () = Self::ALIGN_OK;

        let arena_align = ALIGN.max(WORD);
        config.validate(arena_align)?;
        let arena = Arena::new(config.capacity, arena_align)?;

        let (blocks, first) = BlockTable::new(arena.capacity());
        let mut index = FreeIndex::new();
        index.insert(arena.capacity(), first);

        log::debug!(
            "fitpool: reserved {} byte arena (align {ALIGN}, fallback {:?})",
            arena.capacity(),
            config.fallback,
        );

        Ok(Self {
            arena,
            config,
            state: Mutex::new(PoolState { blocks, index }),
            counters: Counters::default(),
        })
    }

    /// Build a pool of `capacity` bytes with default settings.
    pub fn with_capacity(capacity: usize) -> Result<Self, PoolError> {
        Self::new(PoolConfig::new(capacity))
    }

    /// Arena size in bytes.
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Bookkeeping bytes added to every request (see [`Self::OVERHEAD`]).
    pub fn overhead(&self) -> usize {
        Self::OVERHEAD
    }

    /// Allocate `size` bytes aligned to `ALIGN`.
    ///
    /// Returns `None` when `size` is zero, when `size + overhead` overflows,
    /// or when the request falls back and the fallback fails or is denied.
    /// The returned range never overlaps another live allocation. The bytes
    /// are uninitialised.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let adjusted = size.checked_add(Self::OVERHEAD)?;
        let start = match self.claim(adjusted) {
            Some(start) => start,
            None => self.allocate_fallback(adjusted)?,
        };
        // SAFETY: `start` begins `adjusted >= OVERHEAD` bytes that now belong
        // to this call alone, and ALIGN was checked at construction.
        Some(unsafe { Header::at(start).place_user(ALIGN) })
    }

    /// Allocate `size` zero-filled bytes aligned to `ALIGN`.
    pub fn allocate_zeroed(&self, size: usize) -> Option<NonNull<u8>> {
        let p = self.allocate(size)?;
        // SAFETY: `allocate` returned `size` writable bytes at `p`.
        unsafe { p.as_ptr().write_bytes(0, size) };
        Some(p)
    }

    /// Allocate uninitialised storage for `len` values of `T`.
    ///
    /// `T` must not need more than `ALIGN` alignment (checked at compile
    /// time). Returns `None` when the request is zero bytes, like
    /// [`allocate`](Self::allocate): that is when `len` is zero and also for
    /// every zero-sized `T`. Release with `free(ptr.cast())`.
    pub fn allocate_array<T>(&self, len: usize) -> Option<NonNull<T>> {
        const {
            assert!(
                align_of::<T>() <= ALIGN,
                "element alignment exceeds the pool alignment"
            )
        };
        let bytes = len.checked_mul(size_of::<T>())?;
        self.allocate(bytes).map(NonNull::cast)
    }

    /// Release an allocation.
    ///
    /// Null is a no-op. Pool allocations are returned to the arena and
    /// merged with free neighbours; anything whose header lies outside the
    /// arena is handed back to the system allocator.
    ///
    /// # Errors
    ///
    /// - [`PoolError::DoubleFree`] if a pool allocation was already
    ///   released and its range has not been handed out again.
    /// - [`PoolError::CorruptHeader`] if the header does not name a live
    ///   block at that offset.
    ///
    /// Pool state is unchanged when an error is returned.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by `allocate` (or one of its
    /// variants) on this pool. A fallback allocation must not be released
    /// twice; double frees are only detected for pool allocations.
    pub unsafe fn free(&self, ptr: *mut u8) -> Result<(), PoolError> {
        let Some(user) = NonNull::new(ptr) else {
            return Ok(());
        };
        // SAFETY: the caller guarantees `ptr` came from `allocate`, so the
        // shift tag in front of it is intact.
        let header = unsafe { Header::recover(user) };
        match self.arena.offset_of(header.addr()) {
            Some(offset) => self.release(offset, header),
            None => {
                log::trace!("fitpool: releasing fallback allocation at {:p}", user);
                // SAFETY: outside the arena means `allocate_fallback` made it,
                // and the caller guarantees it is released once.
                unsafe { fallback::release(header) };
                bump(&self.counters.fallback_frees);
                Ok(())
            }
        }
    }

    /// Whether `ptr` points into this pool's arena.
    ///
    /// Pool allocations answer `true`; fallback allocations and foreign
    /// pointers answer `false`.
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.arena.contains(ptr as usize)
    }

    /// Offset of `ptr` from the arena base, if it points into the arena.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        self.arena.offset_of(ptr as usize)
    }

    /// Occupancy and largest free block, taken under the lock.
    pub fn report(&self) -> PoolReport {
        let state = self.state.lock();
        let mut report = PoolReport {
            capacity: self.arena.capacity(),
            used_bytes: 0,
            largest_free: 0,
            free_blocks: 0,
            used_blocks: 0,
        };
        for (_, block) in state.blocks.iter() {
            if block.free {
                report.free_blocks += 1;
                report.largest_free = report.largest_free.max(block.size);
            } else {
                report.used_blocks += 1;
                report.used_bytes += block.size;
            }
        }
        report
    }

    /// Emit the current report at `info` level.
    pub fn log_report(&self) {
        let report = self.report();
        log::info!("fitpool: {} {}", self.block_map(), report);
    }

    /// Every block in address order, taken under the lock.
    pub fn block_map(&self) -> BlockMap {
        let state = self.state.lock();
        BlockMap::new(
            state
                .blocks
                .iter()
                .map(|(_, b)| BlockSpan {
                    offset: b.offset,
                    size: b.size,
                    free: b.free,
                })
                .collect(),
        )
    }

    /// Cumulative operation counters.
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Verify the structural invariants of the block table and free index.
    ///
    /// Checks that the physical list covers the arena without gaps, that
    /// links are symmetric, that no two neighbours are both free, that the
    /// free index holds exactly the free blocks at their current sizes, and
    /// that every descriptor is either linked or recycled.
    pub fn check(&self) -> Result<(), PoolError> {
        let state = self.state.lock();
        let blocks = &state.blocks;
        let fail = |reason: String| Err(PoolError::Inconsistent { reason });

        let head_id = blocks.head();
        let head = blocks.get(head_id);
        if head.size != 0 || head.free || head.offset != 0 || !head.prev.is_none() {
            return fail(format!("head sentinel altered: {head:?}"));
        }

        let mut expected_offset = 0;
        let mut prev_id = head_id;
        let mut prev_free = false;
        let mut free_count = 0;
        let mut largest_free = 0;
        let mut linked = 1;
        for (id, block) in blocks.iter() {
            if block.prev != prev_id {
                return fail(format!(
                    "block {id} links back to {} instead of {prev_id}",
                    block.prev
                ));
            }
            if block.size == 0 {
                return fail(format!("block {id} is empty"));
            }
            if block.offset != expected_offset {
                return fail(format!(
                    "block {id} starts at {} but the previous block ends at {expected_offset}",
                    block.offset
                ));
            }
            if block.free {
                if prev_free {
                    return fail(format!("block {id} and its predecessor are both free"));
                }
                if !state.index.contains(block.size, id) {
                    return fail(format!("free block {id} missing from the index"));
                }
                free_count += 1;
                largest_free = largest_free.max(block.size);
            }
            expected_offset = block.end();
            prev_id = id;
            prev_free = block.free;
            linked += 1;
        }

        if expected_offset != self.arena.capacity() {
            return fail(format!(
                "blocks cover {expected_offset} of {} bytes",
                self.arena.capacity()
            ));
        }
        for (size, id) in state.index.iter() {
            let indexed = blocks.in_range(id) && id != head_id && {
                let block = blocks.get(id);
                block.free && block.size == size
            };
            if !indexed {
                return fail(format!(
                    "index entry ({size}, {id}) does not name a free block of that size"
                ));
            }
        }
        if state.index.len() != free_count {
            return fail(format!(
                "index holds {} entries for {free_count} free blocks",
                state.index.len()
            ));
        }
        if state.index.largest() != largest_free {
            return fail(format!(
                "index reports largest free block {} but the list holds {largest_free}",
                state.index.largest()
            ));
        }
        if linked + blocks.recycled_count() != blocks.descriptor_count() {
            return fail(format!(
                "{linked} linked + {} recycled descriptors, {} issued",
                blocks.recycled_count(),
                blocks.descriptor_count()
            ));
        }
        Ok(())
    }

    /// Find, claim and stamp a block of exactly `adjusted` bytes.
    fn claim(&self, adjusted: usize) -> Option<NonNull<u8>> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let (found, id) = state.index.best_fit(adjusted)?;
        state.index.remove(found, id);

        if found > adjusted {
            let rest = state.blocks.split(id, adjusted);
            state.index.insert(found - adjusted, rest);
            bump(&self.counters.splits);
        }

        let block = state.blocks.get_mut(id);
        block.free = false;
        let start = self.arena.ptr_at(block.offset);
        // SAFETY: the block was just claimed, spans `adjusted >= WORD` bytes
        // inside the arena, and nobody else can reach it.
        unsafe { Header::at(start).set_owner(id.get()) };
        bump(&self.counters.pool_allocations);
        Some(start)
    }

    fn allocate_fallback(&self, adjusted: usize) -> Option<NonNull<u8>> {
        match self.config.fallback {
            FallbackPolicy::System => {
                let start = fallback::allocate(adjusted);
                if start.is_some() {
                    bump(&self.counters.fallback_allocations);
                    log::trace!("fitpool: {adjusted} byte request served by the system allocator");
                }
                start
            }
            FallbackPolicy::Deny => {
                bump(&self.counters.denied_allocations);
                log::trace!("fitpool: {adjusted} byte request denied");
                None
            }
        }
    }

    /// Return the block whose header sits at `offset` to the arena.
    fn release(&self, offset: usize, header: Header) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let state = &mut *state;

        // SAFETY: the header lies inside the arena; its owner word is only
        // written under this lock.
        let owner = unsafe { header.owner() };
        if owner == 0 {
            bump(&self.counters.rejected_frees);
            log::warn!("fitpool: double free at arena offset {offset}");
            return Err(PoolError::DoubleFree { offset });
        }
        let id = BlockId::from_raw(owner);
        let valid = state.blocks.in_range(id) && id != state.blocks.head() && {
            let block = state.blocks.get(id);
            !block.free && block.size > 0 && block.offset == offset
        };
        if !valid {
            bump(&self.counters.rejected_frees);
            log::warn!("fitpool: corrupt header at arena offset {offset} (owner {owner})");
            return Err(PoolError::CorruptHeader { offset, owner });
        }

        // SAFETY: as above.
        unsafe { header.set_owner(0) };
        state.blocks.get_mut(id).free = true;

        let prev = state.blocks.get(id).prev;
        if prev != state.blocks.head() && state.blocks.get(prev).free {
            state.index.remove(state.blocks.get(prev).size, prev);
            state.blocks.absorb_prev(id);
            bump(&self.counters.merges);
        }
        let next = state.blocks.get(id).next;
        if !next.is_none() && state.blocks.get(next).free {
            state.index.remove(state.blocks.get(next).size, next);
            state.blocks.absorb_next(id);
            bump(&self.counters.merges);
        }

        let size = state.blocks.get(id).size;
        state.index.insert(size, id);
        bump(&self.counters.pool_frees);
        Ok(())
    }
}

impl<const ALIGN: usize> Drop for MemoryPool<ALIGN> {
    fn drop(&mut self) {
        if !self.config.leak_check {
            return;
        }
        let capacity = self.arena.capacity();
        let state = self.state.get_mut();
        let first = state.blocks.get(state.blocks.head()).next;
        let intact = !first.is_none() && {
            let block = state.blocks.get(first);
            block.free && block.size == capacity
        } && state.blocks.recycled_count() + 2 == state.blocks.descriptor_count();

        if intact {
            log::debug!("fitpool: releasing {capacity} byte arena");
            return;
        }
        let (live, bytes) = state
            .blocks
            .iter()
            .filter(|(_, b)| !b.free)
            .fold((0usize, 0usize), |(n, sum), (_, b)| (n + 1, sum + b.size));
        log::warn!(
            "fitpool: memory leak detected: {live} allocations ({bytes} bytes) outstanding at teardown"
        );
    }
}
