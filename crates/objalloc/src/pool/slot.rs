//! Typed handle over one slot of a page
//!
//! # Safety
//!
//! A [`Slot`] is only created for a payload address that lies on a slot
//! boundary of a live page. Every accessor below derives its pointer from
//! that address and the page [`SlotLayout`], so the result stays inside the
//! same page allocation.
//!
//! While a slot is free, the first machine word of its payload stores the
//! address of the next free slot (null terminates the list). The word is
//! read and written unaligned because payloads need not be word aligned.

use core::ptr::{self, NonNull};

use super::SlotLayout;

/// Payload address of a slot inside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub(crate) struct Slot(NonNull<u8>);

impl Slot {
    /// # Safety
    /// `payload` must be a slot boundary inside a live page built with the
    /// layout later passed to the accessors.
    #[inline(always)]
    pub(crate) const unsafe fn from_payload(payload: NonNull<u8>) -> Self {
        Self(payload)
    }

    #[inline(always)]
    pub(crate) fn payload(self) -> NonNull<u8> {
        self.0
    }

    #[inline(always)]
    pub(crate) fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// First byte of the header region
    #[inline(always)]
    pub(crate) fn header(self, layout: &SlotLayout) -> *mut u8 {
        // SAFETY: every payload is preceded by `pad + header_bytes` bytes of
        // the same page (the page link plus left fill covers slot 0).
        unsafe {
            self.0
                .as_ptr()
                .sub(layout.pad_bytes() + layout.header_bytes())
        }
    }

    /// First byte of the guard bytes before the payload
    #[inline(always)]
    pub(crate) fn left_pad(self, layout: &SlotLayout) -> *mut u8 {
        // SAFETY: see `header`; the left pad sits between header and payload.
        unsafe { self.0.as_ptr().sub(layout.pad_bytes()) }
    }

    /// First byte of the guard bytes after the payload
    #[inline(always)]
    pub(crate) fn right_pad(self, layout: &SlotLayout) -> *mut u8 {
        // SAFETY: the page reserves `object_size + pad` bytes after the last
        // payload, and every other payload is followed by a full slot stride.
        unsafe { self.0.as_ptr().add(layout.object_size()) }
    }

    /// Next free slot, read from the payload's link word
    ///
    /// # Safety
    /// The slot must currently be on the free list.
    #[inline(always)]
    pub(crate) unsafe fn next_free(self) -> Option<Self> {
        // SAFETY: payloads are at least one word long (validated by the
        // allocator config); the caller guarantees the word is a link.
        let next = unsafe { ptr::read_unaligned(self.0.as_ptr().cast::<*mut u8>()) };
        NonNull::new(next).map(Self)
    }

    /// Overwrites the payload's link word
    ///
    /// # Safety
    /// The slot must not be owned by a client.
    #[inline(always)]
    pub(crate) unsafe fn set_next_free(self, next: Option<Self>) {
        let raw = next.map_or(ptr::null_mut(), |slot| slot.0.as_ptr());
        // SAFETY: the first word of the payload belongs to the allocator
        // while the slot is free.
        unsafe { ptr::write_unaligned(self.0.as_ptr().cast::<*mut u8>(), raw) };
    }
}
