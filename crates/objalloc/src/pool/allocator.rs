//! Main object allocator implementation
//!
//! # Safety
//!
//! This module hands out raw payload addresses carved from pages owned by
//! [`PageManager`]:
//! - Every slot is either on the free list or owned by exactly one client
//! - Free slots store the free-list link in their first payload word
//! - External header records are owned by the slot header pointing at them
//! - Pages outlive every slot and record they contain (teardown releases
//!   records before pages)
//!
//! ## Invariants
//!
//! - `free_objects + objects_in_use == pages_in_use * objects_per_page`
//!   outside bypass mode
//! - `free_objects == free_list.len()` and `pages_in_use == page_list.len()`
//! - In debug mode every pad byte reads [`ObjectAllocator::PAD_PATTERN`]
//!   unless a client wrote out of bounds

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc};
use std::collections::HashSet;

use super::free_list::FreeList;
use super::page::{PageList, PageManager};
use super::slot::Slot;
use super::{AllocatorConfig, AllocatorStats, BlockHeader, HeaderBlock, SlotLayout, pattern};
use crate::error::{AllocError, AllocResult, PadSide};
use crate::traits::MemoryUsage;
use crate::utils::WORD;

#[cfg(feature = "logging")]
use tracing::debug;

/// Fixed-size object allocator
///
/// Serves blocks of one size from pages obtained from the system allocator.
/// Freed blocks are recycled through an intrusive free list; pages are only
/// returned on [`ObjectAllocator::free_empty_pages`] or drop.
///
/// # Memory Layout
/// ```text
/// page: [link][fill][hdr|pad|payload0|pad][fill][hdr|pad|payload1|pad] ...
///                             ↓                          ↓
/// free list:               [free]      →              [used]
/// ```
///
/// In debug mode fresh payloads read [`Self::UNALLOCATED_PATTERN`], live
/// payloads [`Self::ALLOCATED_PATTERN`] and returned payloads
/// [`Self::FREED_PATTERN`] (apart from the link word of free slots).
pub struct ObjectAllocator {
    config: AllocatorConfig,
    free_list: FreeList,
    pages: PageManager,
    stats: AllocatorStats,
    /// Layout used in bypass mode
    system_layout: Layout,
}

impl ObjectAllocator {
    /// Fresh slot, never handed out
    pub const UNALLOCATED_PATTERN: u8 = pattern::UNALLOCATED;
    /// Slot owned by a client
    pub const ALLOCATED_PATTERN: u8 = pattern::ALLOCATED;
    /// Slot returned by a client
    pub const FREED_PATTERN: u8 = pattern::FREED;
    /// Guard bytes
    pub const PAD_PATTERN: u8 = pattern::PAD;
    /// Alignment fill
    pub const ALIGN_PATTERN: u8 = pattern::ALIGN;

    /// Whether [`Self::free_empty_pages`] actually releases memory
    pub const SUPPORTS_PAGE_RECLAIM: bool = true;

    /// Creates an allocator for `object_size`-byte blocks
    ///
    /// Outside bypass mode the first page is acquired immediately.
    ///
    /// # Errors
    /// - [`AllocError::InvalidConfig`] / [`AllocError::SizeOverflow`] for an
    ///   unusable configuration
    /// - [`AllocError::NoMemory`] / [`AllocError::NoPages`] if the first page
    ///   cannot be acquired
    pub fn new(object_size: usize, config: AllocatorConfig) -> AllocResult<Self> {
        config.validate(object_size)?;

        let layout = SlotLayout::compute(object_size, &config)?;
        let system_layout = Layout::from_size_align(object_size, layout.page_align())
            .map_err(|_| AllocError::size_overflow("object layout"))?;

        let mut config = config;
        config.left_align_size = layout.left_align_size();
        config.inter_align_size = layout.inter_align_size();

        let mut allocator = Self {
            config,
            free_list: FreeList::new(),
            pages: PageManager::new(layout, config.max_pages)?,
            stats: AllocatorStats {
                object_size,
                page_size: layout.page_size(),
                ..AllocatorStats::default()
            },
            system_layout,
        };

        if !config.use_system_allocator {
            allocator.acquire_page()?;
        }

        #[cfg(feature = "logging")]
        debug!(
            object_size,
            page_size = layout.page_size(),
            slot_size = layout.slot_size(),
            objects_per_page = config.objects_per_page,
            max_pages = config.max_pages,
            header = ?config.header,
            debug = config.debug,
            bypass = config.use_system_allocator,
            "object allocator created"
        );

        Ok(allocator)
    }

    /// Creates an allocator sized and aligned for values of `T`
    ///
    /// The block size is raised to one machine word when `T` is smaller, and
    /// `T`'s alignment is used unless `config` requests one.
    pub fn for_type<T>(config: AllocatorConfig) -> AllocResult<Self> {
        let value = Layout::new::<T>();
        let alignment = if config.alignment == 0 {
            value.align()
        } else {
            config.alignment
        };
        Self::new(value.size().max(WORD), config.with_alignment(alignment))
    }

    /// Hands out one block
    ///
    /// `label` is stored only by [`HeaderBlock::External`] headers.
    ///
    /// # Errors
    /// - [`AllocError::NoPages`] when the free list is empty and the page
    ///   ceiling is reached
    /// - [`AllocError::NoMemory`] when the system allocator fails
    ///
    /// A failed call leaves the allocator unchanged.
    pub fn allocate(&mut self, label: Option<&str>) -> AllocResult<NonNull<u8>> {
        if self.config.use_system_allocator {
            // SAFETY: object sizes are validated non-zero.
            let raw = unsafe { alloc(self.system_layout) };
            let block = NonNull::new(raw).ok_or_else(|| AllocError::no_memory(self.system_layout.size()))?;
            self.stats.record_allocation(false);
            return Ok(block);
        }

        if self.free_list.is_empty() {
            self.acquire_page()?;
        }
        let slot = self
            .free_list
            .pop()
            .ok_or_else(|| AllocError::no_pages(self.config.max_pages))?;

        let layout = self.pages.layout();
        let allocation_number = self.stats.allocations.wrapping_add(1);

        // SAFETY: `slot` was just popped, so it lies in a live page and no
        // client owns it.
        unsafe {
            if let Err(err) = self.config.header.build(slot, layout, allocation_number, label) {
                self.free_list.push(slot);
                return Err(err);
            }
            if self.config.debug {
                pattern::paint(slot.payload().as_ptr(), pattern::ALLOCATED, layout.object_size());
            }
        }

        self.stats.record_allocation(true);
        Ok(slot.payload())
    }

    /// Returns a block to the allocator
    ///
    /// In debug mode the block is checked for a slot boundary, intact pads
    /// and a live header before anything is modified. The deallocation
    /// counter is bumped even when a check fails.
    ///
    /// # Errors
    /// - [`AllocError::BadBoundary`] (debug) for an address that is not a
    ///   payload of this allocator
    /// - [`AllocError::CorruptedBlock`] (debug) when a pad was overwritten
    /// - [`AllocError::MultipleFree`] (debug) for a block already freed
    ///
    /// # Safety
    /// `block` must have been returned by [`Self::allocate`] on this
    /// allocator. Outside debug mode it must also not have been freed since;
    /// in debug mode those violations are reported as errors instead.
    pub unsafe fn free(&mut self, block: NonNull<u8>) -> AllocResult<()> {
        self.stats.deallocations = self.stats.deallocations.wrapping_add(1);

        if self.config.use_system_allocator {
            // SAFETY: caller guarantees `block` came from `allocate`, which
            // used `system_layout` in bypass mode.
            unsafe { dealloc(block.as_ptr(), self.system_layout) };
            self.stats.record_free(false);
            return Ok(());
        }

        let debug = self.config.debug;
        let slot = if debug {
            self.pages.find_slot(block.as_ptr() as usize)?
        } else {
            // SAFETY: caller guarantees `block` is a payload of this allocator.
            unsafe { Slot::from_payload(block) }
        };

        let layout = self.pages.layout();
        if debug && let Some(side) = self.damaged_pad(slot) {
            return Err(AllocError::corrupted_block(slot.addr(), side));
        }

        // SAFETY: `slot` is a payload boundary of a live page (checked in
        // debug mode, guaranteed by the caller otherwise).
        unsafe {
            self.config.header.release(slot, layout, debug)?;
            if debug {
                pattern::paint(slot.payload().as_ptr(), pattern::FREED, layout.object_size());
            }
            self.free_list.push(slot);
        }

        self.stats.record_free(true);
        Ok(())
    }

    /// Calls `f(block, object_size)` for every block currently handed out
    ///
    /// Returns the number of blocks reported. Always zero in bypass mode.
    pub fn dump_memory_in_use(&self, mut f: impl FnMut(NonNull<u8>, usize)) -> usize {
        if self.config.use_system_allocator {
            return 0;
        }

        let layout = self.pages.layout();
        let header = self.config.header;
        // Headerless slots keep no state; anything off the free list is live.
        let free: HashSet<usize> = if header == HeaderBlock::None {
            self.free_list.iter().map(|block| block.as_ptr() as usize).collect()
        } else {
            HashSet::new()
        };

        let mut reported = 0;
        for slot in self.pages.slots() {
            // SAFETY: `slots` yields payload boundaries of live pages.
            let in_use = unsafe { header.is_in_use(slot, layout) }
                .unwrap_or_else(|| !free.contains(&slot.addr()));
            if in_use {
                f(slot.payload(), layout.object_size());
                reported += 1;
            }
        }
        reported
    }

    /// Calls `f(block, object_size)` for every slot whose pads are damaged
    ///
    /// Only runs in debug mode with non-zero pad bytes; returns the number of
    /// damaged slots.
    pub fn validate_pages(&self, mut f: impl FnMut(NonNull<u8>, usize)) -> usize {
        if !self.config.debug || self.config.pad_bytes == 0 || self.config.use_system_allocator {
            return 0;
        }

        let object_size = self.pages.layout().object_size();
        let mut corrupted = 0;
        for slot in self.pages.slots() {
            if self.damaged_pad(slot).is_some() {
                f(slot.payload(), object_size);
                corrupted += 1;
            }
        }
        corrupted
    }

    /// Releases every page whose slots are all free
    ///
    /// Returns the number of pages released.
    pub fn free_empty_pages(&mut self) -> usize {
        if self.config.use_system_allocator {
            return 0;
        }

        let released = self.pages.reclaim_empty(&mut self.free_list);
        self.stats.pages_in_use -= released;
        self.stats.free_objects -= released * self.config.objects_per_page;
        debug_assert_eq!(self.stats.free_objects, self.free_list.len());
        released
    }

    /// Turns debug instrumentation on or off
    ///
    /// Pages acquired while debug mode was off carry no pad sentinels, so
    /// their slots fail pad checks once it is turned on.
    pub fn set_debug_state(&mut self, state: bool) {
        #[cfg(feature = "logging")]
        if self.config.debug != state {
            debug!(debug = state, "debug state changed");
        }
        self.config.debug = state;
    }

    /// Decodes the header in front of `block`
    ///
    /// # Errors
    /// [`AllocError::BadBoundary`] if `block` is not a payload of this
    /// allocator (always the case in bypass mode).
    pub fn header(&self, block: NonNull<u8>) -> AllocResult<BlockHeader> {
        let slot = self.pages.find_slot(block.as_ptr() as usize)?;
        // SAFETY: `find_slot` returned a payload boundary of a live page.
        Ok(unsafe { self.config.header.inspect(slot, self.pages.layout()) })
    }

    /// Client-owned bytes of an extended header
    ///
    /// Empty for every other header format.
    ///
    /// # Errors
    /// [`AllocError::BadBoundary`] if `block` is not a payload of this
    /// allocator.
    pub fn user_bytes_mut(&mut self, block: NonNull<u8>) -> AllocResult<&mut [u8]> {
        let slot = self.pages.find_slot(block.as_ptr() as usize)?;
        match self.config.header {
            HeaderBlock::Extended { user_bytes } => {
                // SAFETY: the user bytes open the header region of a live
                // page, and `&mut self` keeps the page alive and unaliased
                // for the borrow.
                Ok(unsafe { core::slice::from_raw_parts_mut(slot.header(self.pages.layout()), user_bytes) })
            }
            _ => Ok(&mut []),
        }
    }

    /// Whether `block` is a payload boundary of one of this allocator's pages
    pub fn owns(&self, block: NonNull<u8>) -> bool {
        self.pages.find_slot(block.as_ptr() as usize).is_ok()
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free_list
    }

    pub fn page_list(&self) -> &PageList {
        self.pages.pages()
    }

    /// Configuration, including the derived alignment fill sizes
    pub fn config(&self) -> AllocatorConfig {
        self.config
    }

    pub fn stats(&self) -> AllocatorStats {
        self.stats
    }

    /// Page and slot geometry
    pub fn layout(&self) -> SlotLayout {
        *self.pages.layout()
    }

    fn acquire_page(&mut self) -> AllocResult<()> {
        self.pages.acquire(&mut self.free_list, self.config.debug)?;
        self.stats.pages_in_use += 1;
        self.stats.free_objects += self.config.objects_per_page;
        Ok(())
    }

    /// First damaged guard region of `slot`, left before right
    fn damaged_pad(&self, slot: Slot) -> Option<PadSide> {
        let layout = self.pages.layout();
        let pad = layout.pad_bytes();
        if pad == 0 {
            return None;
        }

        // SAFETY: both pads lie inside the page holding `slot`.
        unsafe {
            if !pattern::is_intact(slot.left_pad(layout), pattern::PAD, pad) {
                Some(PadSide::Left)
            } else if !pattern::is_intact(slot.right_pad(layout), pattern::PAD, pad) {
                Some(PadSide::Right)
            } else {
                None
            }
        }
    }
}

impl Drop for ObjectAllocator {
    fn drop(&mut self) {
        if self.config.header == HeaderBlock::External {
            let layout = self.pages.layout();
            for slot in self.pages.slots() {
                // SAFETY: every slot of a live page; unchecked release skips
                // slots without a record.
                let _ = unsafe { self.config.header.release(slot, layout, false) };
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            pages = self.stats.pages_in_use,
            objects_in_use = self.stats.objects_in_use,
            "object allocator dropped"
        );
        // Pages go back to the system when `self.pages` drops.
    }
}

impl MemoryUsage for ObjectAllocator {
    fn used_memory(&self) -> usize {
        self.stats.bytes_in_use()
    }

    fn available_memory(&self) -> Option<usize> {
        (!self.config.use_system_allocator).then(|| self.stats.free_objects * self.stats.object_size)
    }

    fn reserved_memory(&self) -> Option<usize> {
        (!self.config.use_system_allocator).then(|| self.stats.pages_in_use * self.stats.page_size)
    }
}

impl fmt::Debug for ObjectAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAllocator")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("pages", self.pages.pages())
            .field("free_list", &self.free_list)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(config: AllocatorConfig) -> ObjectAllocator {
        ObjectAllocator::new(16, config).expect("allocator")
    }

    #[test]
    fn test_first_page_acquired_eagerly() {
        let oa = small(AllocatorConfig::default());
        let stats = oa.stats();
        assert_eq!(stats.pages_in_use, 1);
        assert_eq!(stats.free_objects, 4);
        assert_eq!(oa.free_list().len(), 4);
        assert_eq!(oa.page_list().len(), 1);
    }

    #[test]
    fn test_allocation_pops_head() {
        let mut oa = small(AllocatorConfig::default());
        let head = oa.free_list().head().unwrap();
        let block = oa.allocate(None).unwrap();
        assert_eq!(block, head);
        assert_eq!(oa.stats().allocations, 1);
        assert_eq!(oa.stats().objects_in_use, 1);
        unsafe { oa.free(block).unwrap() };
        assert_eq!(oa.free_list().head(), Some(block));
    }

    #[test]
    fn test_debug_patterns() {
        let mut oa = small(AllocatorConfig::default().with_debug(true).with_pad_bytes(2));
        let fresh = oa.free_list().head().unwrap();
        unsafe {
            assert_eq!(*fresh.as_ptr().add(WORD), ObjectAllocator::UNALLOCATED_PATTERN);
            assert_eq!(*fresh.as_ptr().sub(1), ObjectAllocator::PAD_PATTERN);
            assert_eq!(*fresh.as_ptr().add(16), ObjectAllocator::PAD_PATTERN);
        }

        let block = oa.allocate(None).unwrap();
        let payload = unsafe { core::slice::from_raw_parts(block.as_ptr(), 16) };
        assert!(payload.iter().all(|&b| b == ObjectAllocator::ALLOCATED_PATTERN));

        unsafe { oa.free(block).unwrap() };
        let tail = unsafe { core::slice::from_raw_parts(block.as_ptr().add(WORD), 16 - WORD) };
        assert!(tail.iter().all(|&b| b == ObjectAllocator::FREED_PATTERN));
    }

    #[test]
    fn test_alignment_fill_is_painted() {
        let config = AllocatorConfig::default()
            .with_debug(true)
            .with_header(HeaderBlock::Basic)
            .with_alignment(16);
        let oa = small(config);
        let page = oa.page_list().head().unwrap();
        let fill = oa.config().left_align_size();
        assert!(fill > 0);
        let bytes = unsafe { core::slice::from_raw_parts(page.as_ptr().add(WORD), fill) };
        assert!(bytes.iter().all(|&b| b == ObjectAllocator::ALIGN_PATTERN));
    }

    #[test]
    fn test_bypass_mode_tracks_counts_only() {
        let mut oa = ObjectAllocator::new(3, AllocatorConfig::system()).unwrap();
        assert_eq!(oa.page_list().len(), 0);

        let block = oa.allocate(None).unwrap();
        assert_eq!(oa.stats().objects_in_use, 1);
        assert_eq!(oa.stats().free_objects, 0);
        assert!(!oa.owns(block));
        assert_eq!(oa.dump_memory_in_use(|_, _| {}), 0);

        unsafe { oa.free(block).unwrap() };
        assert_eq!(oa.stats().objects_in_use, 0);
        assert_eq!(oa.stats().deallocations, 1);
        assert_eq!(oa.available_memory(), None);
    }

    #[test]
    fn test_memory_usage() {
        let mut oa = small(AllocatorConfig::default());
        let _block = oa.allocate(None).unwrap();
        assert_eq!(oa.used_memory(), 16);
        assert_eq!(oa.available_memory(), Some(48));
        assert_eq!(oa.reserved_memory(), Some(oa.layout().page_size()));
        assert_eq!(oa.memory_usage_percent(), Some(25.0));
    }

    #[test]
    fn test_for_type_uses_value_alignment() {
        #[allow(dead_code)]
        struct Node {
            key: u64,
            left: usize,
            right: usize,
        }

        let oa = ObjectAllocator::for_type::<Node>(AllocatorConfig::default()).unwrap();
        let head = oa.free_list().head().unwrap();
        assert_eq!(head.as_ptr() as usize % align_of::<Node>(), 0);
        assert_eq!(oa.stats().object_size, size_of::<Node>());
    }

    #[test]
    fn test_failed_record_allocation_leaves_state_unchanged() {
        use crate::pool::header::FAIL_NEXT_RECORD;

        let mut oa = small(AllocatorConfig::default().with_header(HeaderBlock::External));
        let head = oa.free_list().head().unwrap();
        let before = oa.stats();

        FAIL_NEXT_RECORD.with(|fail| fail.set(true));
        let err = oa.allocate(Some("lost")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoMemory);

        assert_eq!(oa.stats(), before);
        assert_eq!(oa.free_list().head(), Some(head));
        assert_eq!(oa.free_list().len(), before.free_objects);
        assert_eq!(oa.header(head).unwrap(), BlockHeader::External(None));

        let block = oa.allocate(Some("kept")).unwrap();
        assert_eq!(block, head);
        assert_eq!(oa.header(block).unwrap().allocation_number(), Some(1));
    }
}
