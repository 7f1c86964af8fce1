//! Page acquisition, lookup and release
//!
//! # Safety
//!
//! Pages come from `std::alloc::alloc_zeroed` with the layout returned by
//! [`SlotLayout::page_layout`] and go back through `dealloc` with the same
//! layout. The first word of every page links to the next page; pages are
//! at least word aligned so the link is read and written aligned.
//!
//! ## Invariants
//!
//! - Every page on the list is live and `page_size` bytes long
//! - `PageList::len` equals the number of linked pages
//! - A page is released only after its slots are off the free list

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use std::alloc::{alloc_zeroed, dealloc};

use super::free_list::FreeList;
use super::slot::Slot;
use super::{SlotLayout, pattern};
use crate::error::{AllocError, AllocResult};
use crate::utils::WORD;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Singly linked list of live pages, newest first
pub struct PageList {
    head: Option<NonNull<u8>>,
    len: usize,
    page_size: usize,
}

impl PageList {
    const fn new(page_size: usize) -> Self {
        Self {
            head: None,
            len: 0,
            page_size,
        }
    }

    /// Number of live pages
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Most recently acquired page
    pub fn head(&self) -> Option<NonNull<u8>> {
        self.head
    }

    /// Bytes per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Walks the pages from newest to oldest
    pub fn iter(&self) -> Pages<'_> {
        Pages {
            next: self.head,
            _list: PhantomData,
        }
    }

    /// Page whose byte range contains `addr`
    pub fn owner_of(&self, addr: usize) -> Option<NonNull<u8>> {
        self.iter().find(|page| {
            let start = page.as_ptr() as usize;
            addr >= start && addr - start < self.page_size
        })
    }
}

impl fmt::Debug for PageList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageList")
            .field("head", &self.head)
            .field("len", &self.len)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<'a> IntoIterator for &'a PageList {
    type Item = NonNull<u8>;
    type IntoIter = Pages<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the base addresses of a [`PageList`]
pub struct Pages<'a> {
    next: Option<NonNull<u8>>,
    _list: PhantomData<&'a PageList>,
}

impl Iterator for Pages<'_> {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.next?;
        // SAFETY: linked pages are live while the list is borrowed.
        self.next = unsafe { read_link(page) };
        Some(page)
    }
}

/// # Safety
/// `page` must be a live page.
#[inline]
unsafe fn read_link(page: NonNull<u8>) -> Option<NonNull<u8>> {
    // SAFETY: pages are word aligned and at least one word long.
    NonNull::new(unsafe { page.as_ptr().cast::<*mut u8>().read() })
}

/// # Safety
/// `page` must be a live page.
#[inline]
unsafe fn write_link(page: NonNull<u8>, next: Option<NonNull<u8>>) {
    let raw = next.map_or(ptr::null_mut(), NonNull::as_ptr);
    // SAFETY: pages are word aligned and at least one word long.
    unsafe { page.as_ptr().cast::<*mut u8>().write(raw) };
}

/// Owns every page of one allocator
pub(crate) struct PageManager {
    pages: PageList,
    layout: SlotLayout,
    page_layout: Layout,
    max_pages: usize,
}

impl PageManager {
    pub(crate) fn new(layout: SlotLayout, max_pages: usize) -> AllocResult<Self> {
        Ok(Self {
            pages: PageList::new(layout.page_size()),
            page_layout: layout.page_layout()?,
            layout,
            max_pages,
        })
    }

    pub(crate) fn pages(&self) -> &PageList {
        &self.pages
    }

    pub(crate) fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Allocates one page and pushes all of its slots onto `free_list`
    ///
    /// # Errors
    /// - [`AllocError::NoPages`] when the page ceiling is reached
    /// - [`AllocError::NoMemory`] when the system allocator fails
    pub(crate) fn acquire(&mut self, free_list: &mut FreeList, debug: bool) -> AllocResult<()> {
        if self.max_pages != 0 && self.pages.len >= self.max_pages {
            return Err(AllocError::no_pages(self.max_pages));
        }

        // SAFETY: page layouts are never zero-sized (a page holds at least a
        // link word and one payload).
        let raw = unsafe { alloc_zeroed(self.page_layout) };
        let page = NonNull::new(raw).ok_or_else(|| AllocError::no_memory(self.page_layout.size()))?;

        let layout = &self.layout;
        // SAFETY: `page` is a fresh allocation of `page_size` bytes; every
        // slot accessor stays inside it.
        unsafe {
            if debug {
                pattern::paint(page.as_ptr(), pattern::ALIGN, layout.page_size());
            }
            write_link(page, self.pages.head);

            for index in 0..layout.objects_per_page() {
                let slot = Slot::from_payload(page.add(layout.slot_offset(index)));
                free_list.push(slot);

                if debug {
                    pattern::paint(
                        slot.payload().as_ptr().add(WORD),
                        pattern::UNALLOCATED,
                        layout.object_size() - WORD,
                    );
                    pattern::paint(slot.left_pad(layout), pattern::PAD, layout.pad_bytes());
                    pattern::paint(slot.right_pad(layout), pattern::PAD, layout.pad_bytes());
                }
                ptr::write_bytes(slot.header(layout), 0, layout.header_bytes());
            }
        }

        self.pages.head = Some(page);
        self.pages.len += 1;

        #[cfg(feature = "logging")]
        trace!(
            page = ?page,
            pages_in_use = self.pages.len,
            page_size = layout.page_size(),
            "page acquired"
        );

        Ok(())
    }

    /// Resolves `addr` to the slot whose payload starts there
    ///
    /// # Errors
    /// [`AllocError::BadBoundary`] if no page contains `addr` or it is not
    /// a payload boundary.
    pub(crate) fn find_slot(&self, addr: usize) -> AllocResult<Slot> {
        let page = self
            .pages
            .owner_of(addr)
            .ok_or_else(|| AllocError::bad_boundary(addr))?;
        let offset = addr - page.as_ptr() as usize;

        match self.layout.slot_index(offset) {
            // SAFETY: the offset is a payload boundary inside a live page.
            Some(_) => Ok(unsafe { Slot::from_payload(page.add(offset)) }),
            None => Err(AllocError::bad_boundary(addr)),
        }
    }

    /// Every slot of every page, newest page first
    pub(crate) fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        let layout = &self.layout;
        self.pages.iter().flat_map(move |page| {
            (0..layout.objects_per_page())
                // SAFETY: slot offsets of a live page.
                .map(move |index| unsafe { Slot::from_payload(page.add(layout.slot_offset(index))) })
        })
    }

    /// Releases every page whose slots are all on `free_list`
    ///
    /// Returns the number of pages released.
    pub(crate) fn reclaim_empty(&mut self, free_list: &mut FreeList) -> usize {
        let page_size = self.layout.page_size();
        let per_page = self.layout.objects_per_page();
        let mut reclaimed = 0;
        let mut prev: Option<NonNull<u8>> = None;
        let mut cursor = self.pages.head;

        while let Some(page) = cursor {
            // SAFETY: `page` is linked, hence live.
            let next = unsafe { read_link(page) };
            let start = page.as_ptr() as usize;
            let inside = |addr: usize| addr >= start && addr - start < page_size;

            if free_list.count_where(inside) >= per_page {
                free_list.remove_where(inside);
                // SAFETY: `prev` is a live page still on the list, and `page`
                // has no slot left on the free list.
                unsafe {
                    match prev {
                        Some(kept) => write_link(kept, next),
                        None => self.pages.head = next,
                    }
                    dealloc(page.as_ptr(), self.page_layout);
                }
                self.pages.len -= 1;
                reclaimed += 1;
            } else {
                prev = Some(page);
            }
            cursor = next;
        }

        #[cfg(feature = "logging")]
        if reclaimed > 0 {
            debug!(reclaimed, pages_in_use = self.pages.len, "empty pages released");
        }

        reclaimed
    }

    /// Returns every page to the system allocator
    pub(crate) fn release_all(&mut self) {
        let mut cursor = self.pages.head.take();
        while let Some(page) = cursor {
            // SAFETY: each page is read once and then released with the
            // layout it was allocated with.
            unsafe {
                cursor = read_link(page);
                dealloc(page.as_ptr(), self.page_layout);
            }
        }
        self.pages.len = 0;
    }
}

impl Drop for PageManager {
    fn drop(&mut self) {
        self.release_all();
    }
}
