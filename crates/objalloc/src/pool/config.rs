//! Object allocator configuration

use super::HeaderBlock;
use crate::error::{AllocError, AllocResult};
use crate::utils::WORD;

/// Default number of slots carved out of each page
pub const DEFAULT_OBJECTS_PER_PAGE: usize = 4;
/// Default page ceiling
pub const DEFAULT_MAX_PAGES: usize = 3;

/// Configuration for [`ObjectAllocator`](super::ObjectAllocator)
///
/// Everything except `debug` is fixed for the lifetime of an allocator. The
/// two alignment fillers are derived by the allocator at construction and are
/// only meaningful on the copy returned by `ObjectAllocator::config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocatorConfig {
    /// Forward every request to the system allocator (no pages, no checks)
    pub use_system_allocator: bool,

    /// Slots per page
    pub objects_per_page: usize,

    /// Page ceiling; 0 means unlimited
    pub max_pages: usize,

    /// Enable sentinel painting, boundary checks and double-free detection
    pub debug: bool,

    /// Guard bytes on each side of every payload
    pub pad_bytes: usize,

    /// Per-slot header format
    pub header: HeaderBlock,

    /// Requested alignment of slot payloads; 0 means none
    pub alignment: usize,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) left_align_size: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) inter_align_size: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            use_system_allocator: false,
            objects_per_page: DEFAULT_OBJECTS_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            debug: false,
            pad_bytes: 0,
            header: HeaderBlock::None,
            alignment: 0,
            left_align_size: 0,
            inter_align_size: 0,
        }
    }
}

impl AllocatorConfig {
    /// Production configuration - no instrumentation, unlimited pages
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_pages: 0,
            ..Self::default()
        }
    }

    /// Debug configuration - painted memory, guard bytes and basic headers
    #[must_use]
    pub fn debug() -> Self {
        Self {
            debug: true,
            pad_bytes: 4,
            header: HeaderBlock::Basic,
            max_pages: 0,
            ..Self::default()
        }
    }

    /// Pass-through configuration backed by the system allocator
    #[must_use]
    pub fn system() -> Self {
        Self {
            use_system_allocator: true,
            ..Self::default()
        }
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_system_allocator(mut self, enabled: bool) -> Self {
        self.use_system_allocator = enabled;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_objects_per_page(mut self, objects_per_page: usize) -> Self {
        self.objects_per_page = objects_per_page;
        self
    }

    /// Set the page ceiling (0 = unlimited)
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_pad_bytes(mut self, pad_bytes: usize) -> Self {
        self.pad_bytes = pad_bytes;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_header(mut self, header: HeaderBlock) -> Self {
        self.header = header;
        self
    }

    #[must_use = "builder methods must be chained or built"]
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Filler bytes between the page link and the first header region
    pub fn left_align_size(&self) -> usize {
        self.left_align_size
    }

    /// Filler bytes between consecutive slots
    pub fn inter_align_size(&self) -> usize {
        self.inter_align_size
    }

    /// Whether pages have a finite ceiling
    pub fn is_bounded(&self) -> bool {
        self.max_pages != 0
    }

    /// Checks the configuration against the object size it will serve
    ///
    /// # Errors
    /// Returns [`AllocError::InvalidConfig`] if:
    /// - `object_size` is zero
    /// - `objects_per_page` is zero
    /// - pages are in use and `object_size` cannot hold a free-list link
    ///
    /// # Examples
    /// ```
    /// use objalloc::pool::AllocatorConfig;
    ///
    /// assert!(AllocatorConfig::default().validate(16).is_ok());
    /// assert!(AllocatorConfig::default().validate(2).is_err());
    /// assert!(AllocatorConfig::system().validate(2).is_ok());
    /// ```
    pub fn validate(&self, object_size: usize) -> AllocResult<()> {
        if object_size == 0 {
            return Err(AllocError::invalid_config("object size must be non-zero"));
        }

        if self.objects_per_page == 0 {
            return Err(AllocError::invalid_config(
                "objects per page must be at least 1",
            ));
        }

        if !self.use_system_allocator && object_size < WORD {
            return Err(AllocError::InvalidConfig {
                reason: format!(
                    "object size {object_size} is smaller than a free-list link ({WORD} bytes)"
                ),
            });
        }

        Ok(())
    }
}
