//! System-allocator path for requests the arena cannot serve.
//!
//! Fallback allocations use the same header layout as pool allocations,
//! except that the owner word records the allocation length: `free` only
//! sees the user pointer, and `dealloc` needs the original layout.

#![allow(unsafe_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;

use crate::header::{Header, WORD};

fn layout(len: usize) -> Option<Layout> {
    Layout::from_size_align(len, WORD).ok()
}

/// Reserve `len` bytes from the system allocator and stamp the length
/// into the owner word. Returns the header start.
///
/// `None` if the system allocator refuses or `len` is not a valid layout.
pub(crate) fn allocate(len: usize) -> Option<NonNull<u8>> {
    debug_assert!(len >= WORD);
    let layout = layout(len)?;
    // SAFETY: `len >= WORD > 0`, so the layout is non-zero.
    let start = NonNull::new(unsafe { System.alloc(layout) })?;
    // SAFETY: the fresh allocation spans at least WORD bytes and is unaliased.
    unsafe { Header::at(start).set_owner(len) };
    Some(start)
}

/// Return a fallback allocation to the system allocator.
///
/// # Safety
///
/// `header` must address an allocation made by [`allocate`] that has not
/// been released yet.
pub(crate) unsafe fn release(header: Header) {
    // SAFETY: the caller guarantees the owner word still holds the length
    // written by `allocate`, so the rebuilt layout matches the original.
    unsafe {
        let len = header.owner();
        let layout = Layout::from_size_align_unchecked(len, WORD);
        System.dealloc(header.start().as_ptr(), layout);
    }
}
