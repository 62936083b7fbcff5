//! Byte patterns that tie each allocation's contents to a tag.
//!
//! Byte `i` of an allocation tagged `t` holds `t ^ (i as u8)`. Two live
//! allocations that overlap, or a header write that lands in user memory,
//! show up as a pattern mismatch.

#![allow(unsafe_code)]

use std::ptr::NonNull;

fn expected(tag: u8, i: usize) -> u8 {
    tag ^ (i as u8)
}

/// Write the pattern for `tag` over `size` bytes at `ptr`.
///
/// # Safety
///
/// `ptr` must be valid for writes of `size` bytes.
pub unsafe fn fill(ptr: NonNull<u8>, size: usize, tag: u8) {
    // SAFETY: upheld by the caller.
    let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), size) };
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = expected(tag, i);
    }
}

/// Index of the first byte that does not match the pattern for `tag`.
///
/// # Safety
///
/// `ptr` must be valid for reads of `size` bytes.
pub unsafe fn first_mismatch(ptr: NonNull<u8>, size: usize, tag: u8) -> Option<usize> {
    // SAFETY: upheld by the caller.
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
    bytes
        .iter()
        .enumerate()
        .position(|(i, &b)| b != expected(tag, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_then_verify() {
        let mut buf = vec![0u8; 300];
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        unsafe {
            fill(ptr, 300, 7);
            assert_eq!(first_mismatch(ptr, 300, 7), None);
        }
        buf[200] ^= 1;
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        assert_eq!(unsafe { first_mismatch(ptr, 300, 7) }, Some(200));
    }
}
