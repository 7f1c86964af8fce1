//! Debug sentinel bytes and the helpers that paint and verify them

use crate::utils::WORD;

/// Slot carved from a fresh page, never handed out
pub const UNALLOCATED: u8 = 0xAA;
/// Slot currently owned by a client
pub const ALLOCATED: u8 = 0xBB;
/// Slot returned by a client
pub const FREED: u8 = 0xCC;
/// Guard bytes around every payload
pub const PAD: u8 = 0xDD;
/// Filler for alignment gaps and the bytes of a freshly acquired page
pub const ALIGN: u8 = 0xEE;

/// Fill `len` bytes starting at `ptr` with `pattern`.
///
/// # Safety
/// `ptr` must be valid for writes of `len` bytes.
#[inline]
pub(crate) unsafe fn paint(ptr: *mut u8, pattern: u8, len: usize) {
    // SAFETY: caller guarantees `ptr..ptr + len` is writable.
    unsafe { core::ptr::write_bytes(ptr, pattern, len) };
}

/// Returns true if all `len` bytes at `ptr` still read as `pattern`.
///
/// # Safety
/// `ptr` must be valid for reads of `len` bytes.
pub(crate) unsafe fn is_intact(ptr: *const u8, pattern: u8, len: usize) -> bool {
    let expected = usize::from_ne_bytes([pattern; WORD]);
    let words = len / WORD;
    let tail = len % WORD;

    // SAFETY: every read stays inside `ptr..ptr + len`, which the caller
    // guarantees is readable. Word reads are unaligned.
    unsafe {
        let wide = ptr.cast::<usize>();
        for i in 0..words {
            if wide.add(i).read_unaligned() != expected {
                return false;
            }
        }

        let rest = ptr.add(words * WORD);
        for i in 0..tail {
            if rest.add(i).read() != pattern {
                return false;
            }
        }
    }

    true
}
