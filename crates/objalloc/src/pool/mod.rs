//! Page-based fixed-size object pool
//!
//! [`ObjectAllocator`] carves pages into equally sized slots and recycles
//! them through an intrusive free list. Optional header blocks, guard pads
//! and debug patterns make misuse (double frees, overruns, foreign
//! pointers) detectable at `free` time.

mod allocator;
mod config;
mod free_list;
mod header;
mod layout;
mod page;
mod pattern;
mod slot;
mod stats;

pub use allocator::ObjectAllocator;
pub use config::{AllocatorConfig, DEFAULT_MAX_PAGES, DEFAULT_OBJECTS_PER_PAGE};
pub use free_list::{FreeList, Iter as FreeListIter};
pub use header::{BlockHeader, ExternalInfo, HeaderBlock};
pub use layout::SlotLayout;
pub use page::{PageList, Pages};
pub use stats::AllocatorStats;
