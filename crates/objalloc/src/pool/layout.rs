//! Page and slot geometry
//!
//! ```text
//! page
//! ├── [next page link: WORD]
//! ├── [left align fill]
//! ├── slot 0: [header][pad][payload][pad]
//! ├── [inter align fill]
//! ├── slot 1: [header][pad][payload][pad]
//! │   ...
//! └── slot N-1: [header][pad][payload][pad]      (no trailing fill)
//! ```
//!
//! All offsets are computed once per allocator and never change.

use core::alloc::Layout;

use super::AllocatorConfig;
use crate::error::{AllocError, AllocResult};
use crate::utils::{WORD, align, largest_pow2_dividing};

/// Derived geometry of one allocator's pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    object_size: usize,
    pad_bytes: usize,
    header_bytes: usize,
    objects_per_page: usize,
    header_size: usize,
    slot_size: usize,
    page_size: usize,
    left_align_size: usize,
    inter_align_size: usize,
    page_align: usize,
}

impl SlotLayout {
    /// Computes the geometry for `object_size` under `config`
    ///
    /// # Errors
    /// Returns [`AllocError::SizeOverflow`] when any derived size does not fit
    /// in a `usize`, and [`AllocError::InvalidConfig`] for zero slots per page.
    pub fn compute(object_size: usize, config: &AllocatorConfig) -> AllocResult<Self> {
        if config.objects_per_page == 0 {
            return Err(AllocError::invalid_config(
                "objects per page must be at least 1",
            ));
        }

        let pad = config.pad_bytes;
        let header_bytes = config.header.size();
        let overflow = || AllocError::size_overflow("slot layout");

        let left = WORD
            .checked_add(header_bytes)
            .and_then(|n| n.checked_add(pad))
            .ok_or_else(overflow)?;
        let header_size = align(left, config.alignment).ok_or_else(overflow)?;

        let mid = pad
            .checked_mul(2)
            .and_then(|n| n.checked_add(object_size))
            .and_then(|n| n.checked_add(header_bytes))
            .ok_or_else(overflow)?;
        let slot_size = align(mid, config.alignment).ok_or_else(overflow)?;

        let page_size = slot_size
            .checked_mul(config.objects_per_page - 1)
            .and_then(|n| n.checked_add(header_size))
            .and_then(|n| n.checked_add(object_size))
            .and_then(|n| n.checked_add(pad))
            .ok_or_else(|| AllocError::size_overflow("page size"))?;

        Ok(Self {
            object_size,
            pad_bytes: pad,
            header_bytes,
            objects_per_page: config.objects_per_page,
            header_size,
            slot_size,
            page_size,
            left_align_size: header_size - left,
            inter_align_size: slot_size - mid,
            page_align: WORD.max(largest_pow2_dividing(config.alignment)),
        })
    }

    pub fn object_size(&self) -> usize {
        self.object_size
    }

    /// Offset of the first payload from the start of a page
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Distance between two consecutive payloads
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pad_bytes(&self) -> usize {
        self.pad_bytes
    }

    /// Size of one header region
    pub fn header_bytes(&self) -> usize {
        self.header_bytes
    }

    pub fn objects_per_page(&self) -> usize {
        self.objects_per_page
    }

    pub fn left_align_size(&self) -> usize {
        self.left_align_size
    }

    pub fn inter_align_size(&self) -> usize {
        self.inter_align_size
    }

    /// Alignment requested from the system allocator for each page
    pub fn page_align(&self) -> usize {
        self.page_align
    }

    /// Offset of slot `index`'s payload from the start of its page
    #[inline]
    pub fn slot_offset(&self, index: usize) -> usize {
        debug_assert!(index < self.objects_per_page);
        self.header_size + index * self.slot_size
    }

    /// Maps a payload offset back to its slot index, if it is a slot boundary
    #[inline]
    pub fn slot_index(&self, offset: usize) -> Option<usize> {
        let relative = offset.checked_sub(self.header_size)?;
        if !relative.is_multiple_of(self.slot_size) {
            return None;
        }
        let index = relative / self.slot_size;
        (index < self.objects_per_page).then_some(index)
    }

    /// Layout handed to the system allocator for one page
    pub fn page_layout(&self) -> AllocResult<Layout> {
        Layout::from_size_align(self.page_size, self.page_align)
            .map_err(|_| AllocError::size_overflow("page layout"))
    }
}
