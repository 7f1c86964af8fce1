//! Header blocks stored in front of every slot
//!
//! ```text
//! None      []
//! Basic     [alloc_num: u32][flag: u8]
//! Extended  [user bytes: N][use_count: u16][alloc_num: u32][flag: u8]
//! External  [*mut ExternalRecord]
//! ```
//!
//! Multi-byte fields are native-endian and unaligned. The flag byte of the
//! basic and extended layouts is always the last byte of the header region.

#[cfg(test)]
use core::cell::Cell;
use core::ptr;
use std::alloc::{Layout, alloc};

use super::slot::Slot;
use super::{SlotLayout, pattern};
use crate::error::{AllocError, AllocResult};
use crate::utils::WORD;

#[cfg(feature = "logging")]
use tracing::trace;

/// Per-slot header format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeaderBlock {
    /// No header bytes
    #[default]
    None,
    /// Allocation number and in-use flag
    Basic,
    /// Client-owned bytes, a reuse counter, then a basic header
    Extended {
        /// Bytes reserved for the client at the front of the header
        user_bytes: usize,
    },
    /// Pointer to a heap-allocated record that can carry a label
    External,
}

impl HeaderBlock {
    /// Bytes used by [`HeaderBlock::Basic`]
    pub const BASIC_SIZE: usize = 4 + 1;
    /// Bytes [`HeaderBlock::Extended`] adds on top of its user bytes
    pub const EXTENDED_OVERHEAD: usize = 2 + Self::BASIC_SIZE;
    /// Bytes used by [`HeaderBlock::External`]
    pub const EXTERNAL_SIZE: usize = WORD;

    /// Size of the header region in bytes
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Basic => Self::BASIC_SIZE,
            Self::Extended { user_bytes } => user_bytes.saturating_add(Self::EXTENDED_OVERHEAD),
            Self::External => Self::EXTERNAL_SIZE,
        }
    }

    /// Offset of the `[alloc_num][flag]` pair inside the region
    const fn basic_offset(self) -> usize {
        match self {
            Self::Extended { user_bytes } => user_bytes + 2,
            _ => 0,
        }
    }

    /// Stamps the header of a slot that is being handed out
    ///
    /// On error nothing has been written.
    ///
    /// # Safety
    /// `slot` must belong to a page laid out with `layout`, and must have
    /// just been taken off the free list.
    pub(crate) unsafe fn build(
        self,
        slot: Slot,
        layout: &SlotLayout,
        allocation_number: u32,
        label: Option<&str>,
    ) -> AllocResult<()> {
        let region = slot.header(layout);

        match self {
            Self::None => {}
            Self::Basic => {
                // SAFETY: the region holds BASIC_SIZE bytes of this page.
                unsafe { write_basic(region, allocation_number) };
            }
            Self::Extended { user_bytes } => {
                // SAFETY: the region holds user_bytes + EXTENDED_OVERHEAD
                // bytes of this page.
                unsafe {
                    let counter = region.add(user_bytes).cast::<u16>();
                    counter.write_unaligned(counter.read_unaligned().wrapping_add(1));
                    write_basic(region.add(self.basic_offset()), allocation_number);
                }
            }
            Self::External => {
                let record = ExternalRecord::allocate(allocation_number, label)?;
                // SAFETY: the region holds one pointer-sized slot.
                unsafe { region.cast::<*mut ExternalRecord>().write_unaligned(record) };
            }
        }

        Ok(())
    }

    /// Clears the header of a slot that is being returned
    ///
    /// With `check` set, an already released header is reported as
    /// [`AllocError::MultipleFree`]. Without it, external headers treat a
    /// missing record as a no-op and the other layouts are cleared blindly.
    ///
    /// # Safety
    /// `slot` must be a slot boundary of a page laid out with `layout`.
    pub(crate) unsafe fn release(self, slot: Slot, layout: &SlotLayout, check: bool) -> AllocResult<()> {
        let region = slot.header(layout);

        match self {
            Self::None => {
                if check && layout.object_size() > 0 {
                    // SAFETY: the payload is object_size bytes long.
                    let last = unsafe { slot.payload().as_ptr().add(layout.object_size() - 1).read() };
                    if last == pattern::FREED {
                        return Err(AllocError::multiple_free(slot.addr()));
                    }
                }
            }
            Self::Basic | Self::Extended { .. } => {
                // SAFETY: the basic pair lies inside the header region.
                unsafe {
                    let basic = region.add(self.basic_offset());
                    if check && basic.add(4).read() == 0 {
                        return Err(AllocError::multiple_free(slot.addr()));
                    }
                    ptr::write_bytes(basic, 0, Self::BASIC_SIZE);
                }
            }
            Self::External => {
                let cell = region.cast::<*mut ExternalRecord>();
                // SAFETY: the region holds one pointer-sized slot.
                let record = unsafe { cell.read_unaligned() };
                if record.is_null() {
                    if check {
                        return Err(AllocError::multiple_free(slot.addr()));
                    }
                    return Ok(());
                }
                // SAFETY: non-null records were produced by
                // `ExternalRecord::allocate` and are released only here.
                unsafe {
                    drop(Box::from_raw(record));
                    cell.write_unaligned(ptr::null_mut());
                }
            }
        }

        Ok(())
    }

    /// Whether the header marks the slot as handed out
    ///
    /// Returns `None` for [`HeaderBlock::None`], which keeps no state.
    ///
    /// # Safety
    /// `slot` must be a slot boundary of a page laid out with `layout`.
    pub(crate) unsafe fn is_in_use(self, slot: Slot, layout: &SlotLayout) -> Option<bool> {
        let region = slot.header(layout);
        match self {
            Self::None => None,
            // SAFETY: the flag byte is the last byte of the region.
            Self::Basic | Self::Extended { .. } => {
                Some(unsafe { region.add(self.basic_offset() + 4).read() } != 0)
            }
            // SAFETY: the region holds one pointer-sized slot.
            Self::External => Some(unsafe { !region.cast::<*mut ExternalRecord>().read_unaligned().is_null() }),
        }
    }

    /// Decodes the header of a slot
    ///
    /// # Safety
    /// `slot` must be a slot boundary of a page laid out with `layout`.
    pub(crate) unsafe fn inspect(self, slot: Slot, layout: &SlotLayout) -> BlockHeader {
        let region = slot.header(layout);

        // SAFETY: each arm reads only inside the header region.
        unsafe {
            match self {
                Self::None => BlockHeader::None,
                Self::Basic => {
                    let (allocation_number, in_use) = read_basic(region);
                    BlockHeader::Basic {
                        allocation_number,
                        in_use,
                    }
                }
                Self::Extended { user_bytes } => {
                    let (allocation_number, in_use) = read_basic(region.add(self.basic_offset()));
                    BlockHeader::Extended {
                        user_bytes: core::slice::from_raw_parts(region, user_bytes).to_vec(),
                        use_count: region.add(user_bytes).cast::<u16>().read_unaligned(),
                        allocation_number,
                        in_use,
                    }
                }
                Self::External => {
                    let record = region.cast::<*const ExternalRecord>().read_unaligned();
                    BlockHeader::External(record.as_ref().map(ExternalRecord::info))
                }
            }
        }
    }
}

/// # Safety
/// `at` must be valid for writes of `HeaderBlock::BASIC_SIZE` bytes.
#[inline]
unsafe fn write_basic(at: *mut u8, allocation_number: u32) {
    // SAFETY: caller contract.
    unsafe {
        at.cast::<u32>().write_unaligned(allocation_number);
        at.add(4).write(1);
    }
}

/// # Safety
/// `at` must be valid for reads of `HeaderBlock::BASIC_SIZE` bytes.
#[inline]
unsafe fn read_basic(at: *const u8) -> (u32, bool) {
    // SAFETY: caller contract.
    unsafe { (at.cast::<u32>().read_unaligned(), at.add(4).read() != 0) }
}

/// Side record referenced by an external header
#[derive(Debug)]
pub(crate) struct ExternalRecord {
    in_use: bool,
    allocation_number: u32,
    label: Option<String>,
}

#[cfg(test)]
thread_local! {
    /// Makes the next record allocation on this thread report exhaustion
    pub(crate) static FAIL_NEXT_RECORD: Cell<bool> = const { Cell::new(false) };
}

impl ExternalRecord {
    /// Allocates a record through the fallible system allocator
    fn allocate(allocation_number: u32, label: Option<&str>) -> AllocResult<*mut Self> {
        #[cfg(test)]
        if FAIL_NEXT_RECORD.with(|fail| fail.replace(false)) {
            return Err(AllocError::no_memory(size_of::<Self>()));
        }

        let label = match label {
            Some(text) => {
                let mut owned = String::new();
                owned
                    .try_reserve_exact(text.len())
                    .map_err(|_| AllocError::no_memory(text.len()))?;
                owned.push_str(text);
                Some(owned)
            }
            None => None,
        };

        let layout = Layout::new::<Self>();
        // SAFETY: ExternalRecord is not zero-sized.
        let raw = unsafe { alloc(layout) }.cast::<Self>();
        if raw.is_null() {
            return Err(AllocError::no_memory(layout.size()));
        }

        #[cfg(feature = "logging")]
        trace!(allocation_number, labelled = label.is_some(), "external header record allocated");

        // SAFETY: `raw` is a fresh, properly aligned allocation for Self,
        // which makes it a valid `Box<Self>` once initialized.
        unsafe {
            raw.write(Self {
                in_use: true,
                allocation_number,
                label,
            });
        }
        Ok(raw)
    }

    fn info(&self) -> ExternalInfo {
        ExternalInfo {
            in_use: self.in_use,
            allocation_number: self.allocation_number,
            label: self.label.clone(),
        }
    }
}

/// Decoded contents of a slot header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHeader {
    None,
    Basic {
        allocation_number: u32,
        in_use: bool,
    },
    Extended {
        user_bytes: Vec<u8>,
        /// Times this slot has been handed out; survives frees
        use_count: u16,
        allocation_number: u32,
        in_use: bool,
    },
    /// `None` once the block has been released
    External(Option<ExternalInfo>),
}

impl BlockHeader {
    /// Allocation number of the current owner, if the header records one
    #[must_use]
    pub fn allocation_number(&self) -> Option<u32> {
        match self {
            Self::Basic { allocation_number, in_use: true }
            | Self::Extended {
                allocation_number,
                in_use: true,
                ..
            } => Some(*allocation_number),
            Self::External(Some(info)) => Some(info.allocation_number),
            _ => None,
        }
    }
}

/// Copy of an external header record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalInfo {
    pub in_use: bool,
    pub allocation_number: u32,
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::AllocatorConfig;
    use core::ptr::NonNull;

    /// Lays out a single fake slot inside a local buffer
    fn with_slot(header: HeaderBlock, f: impl FnOnce(Slot, &SlotLayout)) {
        let config = AllocatorConfig::default()
            .with_objects_per_page(1)
            .with_header(header)
            .with_pad_bytes(2);
        let layout = SlotLayout::compute(16, &config).unwrap();
        let mut page = vec![0u8; layout.page_size()];
        let payload = NonNull::new(page.as_mut_ptr().wrapping_add(layout.slot_offset(0))).unwrap();
        let slot = unsafe { Slot::from_payload(payload) };
        f(slot, &layout);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(HeaderBlock::None.size(), 0);
        assert_eq!(HeaderBlock::Basic.size(), 5);
        assert_eq!(HeaderBlock::Extended { user_bytes: 3 }.size(), 10);
        assert_eq!(HeaderBlock::External.size(), WORD);
    }

    #[test]
    fn test_basic_build_release() {
        let header = HeaderBlock::Basic;
        with_slot(header, |slot, layout| unsafe {
            header.build(slot, layout, 7, None).unwrap();
            assert_eq!(header.is_in_use(slot, layout), Some(true));
            assert_eq!(
                header.inspect(slot, layout),
                BlockHeader::Basic {
                    allocation_number: 7,
                    in_use: true
                }
            );

            header.release(slot, layout, true).unwrap();
            assert_eq!(header.is_in_use(slot, layout), Some(false));
            let err = header.release(slot, layout, true).unwrap_err();
            assert!(matches!(err, AllocError::MultipleFree { .. }));
            // unchecked release of a cleared header is silent
            header.release(slot, layout, false).unwrap();
        });
    }

    #[test]
    fn test_extended_counter_survives_release() {
        let header = HeaderBlock::Extended { user_bytes: 2 };
        with_slot(header, |slot, layout| unsafe {
            header.build(slot, layout, 1, None).unwrap();
            header.release(slot, layout, true).unwrap();
            header.build(slot, layout, 2, None).unwrap();

            match header.inspect(slot, layout) {
                BlockHeader::Extended {
                    user_bytes,
                    use_count,
                    allocation_number,
                    in_use,
                } => {
                    assert_eq!(user_bytes, vec![0, 0]);
                    assert_eq!(use_count, 2);
                    assert_eq!(allocation_number, 2);
                    assert!(in_use);
                }
                other => panic!("unexpected header {other:?}"),
            }
            header.release(slot, layout, true).unwrap();
        });
    }

    #[test]
    fn test_external_label_and_release() {
        let header = HeaderBlock::External;
        with_slot(header, |slot, layout| unsafe {
            header.build(slot, layout, 3, Some("node")).unwrap();
            let decoded = header.inspect(slot, layout);
            assert_eq!(decoded.allocation_number(), Some(3));
            match decoded {
                BlockHeader::External(Some(info)) => {
                    assert!(info.in_use);
                    assert_eq!(info.label.as_deref(), Some("node"));
                }
                other => panic!("unexpected header {other:?}"),
            }

            header.release(slot, layout, true).unwrap();
            assert_eq!(header.inspect(slot, layout), BlockHeader::External(None));
            assert!(header.release(slot, layout, true).is_err());
            assert!(header.release(slot, layout, false).is_ok());
        });
    }

    #[test]
    fn test_none_detects_freed_pattern() {
        let header = HeaderBlock::None;
        with_slot(header, |slot, layout| unsafe {
            assert_eq!(header.is_in_use(slot, layout), None);
            header.release(slot, layout, true).unwrap();
            pattern::paint(slot.payload().as_ptr(), pattern::FREED, layout.object_size());
            assert!(header.release(slot, layout, true).is_err());
        });
    }
}
