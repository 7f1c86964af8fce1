//! # objalloc
//!
//! Fixed-size object pool allocator with debug instrumentation.
//!
//! Containers that create many nodes of one size (trees, lists, hash
//! buckets) can take their nodes from an [`ObjectAllocator`] instead of the
//! general-purpose heap:
//! - Pages are requested from the system allocator in bulk and carved into
//!   equally sized slots
//! - Freed slots are recycled through an intrusive free list
//! - Optional per-slot headers record allocation numbers, reuse counts or
//!   labelled side records
//! - Debug mode paints memory with sentinel bytes, guards every payload with
//!   pad bytes and rejects foreign pointers, overruns and double frees
//!
//! ## Quick Start
//!
//! ```rust
//! use objalloc::prelude::*;
//!
//! let config = AllocatorConfig::debug().with_objects_per_page(8);
//! let mut oa = ObjectAllocator::new(32, config)?;
//!
//! let block = oa.allocate(None)?;
//! assert_eq!(oa.stats().objects_in_use, 1);
//!
//! // SAFETY: `block` came from `oa` and is freed once.
//! unsafe { oa.free(block)? };
//!
//! // a second free is caught in debug mode
//! let err = unsafe { oa.free(block) }.unwrap_err();
//! assert!(err.is_client_misuse());
//! # Ok::<(), objalloc::AllocError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured diagnostics through `tracing`
//! - `serde`: `Serialize`/`Deserialize` for configuration and statistics
//!
//! The allocator is single-threaded: it is neither `Send` nor `Sync`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
// Header fields are read and written unaligned through casted pointers
#![allow(clippy::cast_ptr_alignment)]
// `# Safety` sections on pub(crate) helpers live in the module docs
#![allow(clippy::missing_safety_doc)]

pub mod error;
pub mod pool;
pub mod traits;
pub mod utils;

pub use error::{AllocError, AllocResult, ErrorKind, PadSide, Result};
pub use pool::{
    AllocatorConfig, AllocatorStats, BlockHeader, ExternalInfo, FreeList, HeaderBlock,
    ObjectAllocator, PageList, SlotLayout,
};
pub use traits::MemoryUsage;

/// Convenient imports for allocator users
pub mod prelude {
    pub use crate::error::{AllocError, AllocResult, ErrorKind, PadSide};
    pub use crate::pool::{
        AllocatorConfig, AllocatorStats, BlockHeader, ExternalInfo, HeaderBlock, ObjectAllocator,
    };
    pub use crate::traits::MemoryUsage;
}
