//! Hidden allocation headers.
//!
//! Every allocation, pooled or not, starts with the same bookkeeping:
//!
//! ```text
//! start        start+WORD                   user-2   user              user+size
//! ┌────────────┬─────────────────────────────┬───────┬─────────────────┬──────┐
//! │ owner word │ alignment slack             │ shift │ user bytes      │ tail │
//! └────────────┴─────────────────────────────┴───────┴─────────────────┴──────┘
//! ```
//!
//! The owner word holds the block id for pool allocations and the total
//! length for fallback allocations. `shift` is the distance from
//! `start + WORD` to the user pointer, so `free` can walk back to `start`
//! knowing nothing but the user pointer.
//!
//! None of these accesses are aligned: blocks have arbitrary sizes, so a
//! header may start at any byte offset.

#![allow(unsafe_code)]

use std::mem::size_of;
use std::ptr::NonNull;

/// Width of the owner word.
pub const WORD: usize = size_of::<usize>();

/// Width of the shift tag stored right before the user pointer.
pub const SHIFT_TAG: usize = size_of::<u16>();

/// Largest supported alignment. The shift tag is a `u16` and must be able
/// to span the slack in front of an aligned pointer.
pub const MAX_ALIGN: usize = 0x8000;

/// Bookkeeping bytes added to every request for a given alignment.
pub const fn overhead(align: usize) -> usize {
    WORD + (align - 1) + SHIFT_TAG
}

/// The header of one allocation, addressed by its first byte.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Header {
    start: NonNull<u8>,
}

impl Header {
    /// Address the header beginning at `start`.
    pub(crate) fn at(start: NonNull<u8>) -> Self {
        Self { start }
    }

    /// Walk back from a user pointer to its header.
    ///
    /// # Safety
    ///
    /// `user` must have been produced by [`Header::place_user`] and its
    /// allocation must not have been released.
    pub(crate) unsafe fn recover(user: NonNull<u8>) -> Self {
        // SAFETY: the caller guarantees `user - SHIFT_TAG .. user` holds the
        // tag written by `place_user`, and `user - shift - WORD` is the
        // header start of the same allocation.
        unsafe {
            let shift = user.as_ptr().sub(SHIFT_TAG).cast::<u16>().read_unaligned() as usize;
            let start = user.as_ptr().sub(shift + WORD);
            Self {
                start: NonNull::new_unchecked(start),
            }
        }
    }

    pub(crate) fn start(&self) -> NonNull<u8> {
        self.start
    }

    pub(crate) fn addr(&self) -> usize {
        self.start.as_ptr() as usize
    }

    /// Read the owner word.
    ///
    /// # Safety
    ///
    /// The `WORD` bytes at `start` must be readable.
    pub(crate) unsafe fn owner(&self) -> usize {
        // SAFETY: upheld by the caller.
        unsafe { self.start.as_ptr().cast::<usize>().read_unaligned() }
    }

    /// Overwrite the owner word.
    ///
    /// # Safety
    ///
    /// The `WORD` bytes at `start` must be writable and not aliased.
    pub(crate) unsafe fn set_owner(&self, owner: usize) {
        // SAFETY: upheld by the caller.
        unsafe { self.start.as_ptr().cast::<usize>().write_unaligned(owner) }
    }

    /// Compute the `align`-aligned user pointer and stamp the shift tag.
    ///
    /// # Safety
    ///
    /// The allocation must span at least `overhead(align)` bytes from
    /// `start` and be exclusively owned by the caller. `align` must be a
    /// power of two no larger than [`MAX_ALIGN`].
    pub(crate) unsafe fn place_user(&self, align: usize) -> NonNull<u8> {
        debug_assert!(align.is_power_of_two() && align <= MAX_ALIGN);
        // SAFETY: `body + shift` stays within `start + overhead(align)`
        // because `shift <= SHIFT_TAG + align - 1`; the tag occupies the two
        // bytes right before the user pointer, which are past the owner word.
        unsafe {
            let body = self.start.as_ptr().add(WORD);
            let addr = body as usize;
            let aligned = (addr + SHIFT_TAG + align - 1) & !(align - 1);
            let shift = aligned - addr;
            let user = body.add(shift);
            user.sub(SHIFT_TAG).cast::<u16>().write_unaligned(shift as u16);
            NonNull::new_unchecked(user)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    #[test]
    fn overhead_counts_word_slack_and_tag() {
        assert_eq!(overhead(1), WORD + SHIFT_TAG);
        assert_eq!(overhead(64), WORD + 63 + 2);
    }

    #[test]
    fn max_shift_fits_the_tag() {
        assert!(SHIFT_TAG + MAX_ALIGN - 1 <= u16::MAX as usize);
    }

    #[test]
    fn place_then_recover_finds_start() {
        for align in [1usize, 2, 8, 64, 4096] {
            for misalign in 0..8 {
                let mut buf = buffer(overhead(align) + 16 + misalign);
                let start = NonNull::new(buf.as_mut_ptr().wrapping_add(misalign)).unwrap();
                let header = Header::at(start);
                // SAFETY: `buf` spans overhead(align) bytes past `start`.
                let user = unsafe { header.place_user(align) };
                assert_eq!(user.as_ptr() as usize % align, 0);
                // SAFETY: `user` was just placed.
                let back = unsafe { Header::recover(user) };
                assert_eq!(back.start(), start);
            }
        }
    }

    #[test]
    fn user_range_stays_inside_allocation() {
        let align = 64;
        let size = 100;
        let mut buf = buffer(size + overhead(align));
        let start = NonNull::new(buf.as_mut_ptr()).unwrap();
        // SAFETY: `buf` spans size + overhead bytes.
        let user = unsafe { Header::at(start).place_user(align) };
        let user_end = user.as_ptr() as usize + size;
        assert!(user_end <= buf.as_ptr() as usize + buf.len());
        assert!(user.as_ptr() as usize >= start.as_ptr() as usize + WORD + SHIFT_TAG);
    }

    #[test]
    fn owner_word_round_trips_unaligned() {
        let mut buf = buffer(WORD + 3);
        let start = NonNull::new(buf.as_mut_ptr().wrapping_add(3)).unwrap();
        let header = Header::at(start);
        // SAFETY: WORD bytes from `start` lie inside `buf`.
        unsafe {
            header.set_owner(0xDEAD_BEEF);
            assert_eq!(header.owner(), 0xDEAD_BEEF);
            header.set_owner(0);
            assert_eq!(header.owner(), 0);
        }
    }
}
