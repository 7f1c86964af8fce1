//! Error types for objalloc
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Types
// ============================================================================

/// Which guard region of a slot failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadSide {
    /// Pad bytes between the header region and the payload
    Left,
    /// Pad bytes after the payload
    Right,
}

impl core::fmt::Display for PadSide {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Object allocator errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    // --- Resource Errors ---
    #[error("Out of physical memory: system allocator refused {size} bytes")]
    NoMemory { size: usize },

    #[error("Out of logical memory: page limit of {max_pages} reached")]
    NoPages { max_pages: usize },

    // --- Client Misuse ---
    #[error("Block address {address:#x} is not on a slot boundary of any page")]
    BadBoundary { address: usize },

    #[error("Block at {address:#x} has already been freed")]
    MultipleFree { address: usize },

    #[error("Block at {address:#x} has corrupted {side} pad bytes")]
    CorruptedBlock { address: usize, side: PadSide },

    // --- Setup Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },
}

/// Fieldless category of an [`AllocError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoMemory,
    NoPages,
    BadBoundary,
    MultipleFree,
    CorruptedBlock,
    InvalidConfig,
    SizeOverflow,
}

impl AllocError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoMemory { .. } => "OA:NO_MEMORY",
            Self::NoPages { .. } => "OA:NO_PAGES",
            Self::BadBoundary { .. } => "OA:BAD_BOUNDARY",
            Self::MultipleFree { .. } => "OA:MULTIPLE_FREE",
            Self::CorruptedBlock { .. } => "OA:CORRUPTED_BLOCK",
            Self::InvalidConfig { .. } => "OA:CONFIG:INVALID",
            Self::SizeOverflow { .. } => "OA:CONFIG:OVERFLOW",
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMemory { .. } => ErrorKind::NoMemory,
            Self::NoPages { .. } => ErrorKind::NoPages,
            Self::BadBoundary { .. } => ErrorKind::BadBoundary,
            Self::MultipleFree { .. } => ErrorKind::MultipleFree,
            Self::CorruptedBlock { .. } => ErrorKind::CorruptedBlock,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::SizeOverflow { .. } => ErrorKind::SizeOverflow,
        }
    }

    /// True when the error was caused by the caller handing back a bad block
    #[must_use]
    pub fn is_client_misuse(&self) -> bool {
        matches!(
            self,
            Self::BadBoundary { .. } | Self::MultipleFree { .. } | Self::CorruptedBlock { .. }
        )
    }

    /// Check if the request could succeed after memory is returned to the allocator
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoPages { .. } | Self::NoMemory { .. })
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create out-of-physical-memory error
    pub fn no_memory(size: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, "system allocator refused request");

        Self::NoMemory { size }
    }

    /// Create page-limit error
    pub fn no_pages(max_pages: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(max_pages, "page limit reached");

        Self::NoPages { max_pages }
    }

    pub fn bad_boundary(address: usize) -> Self {
        #[cfg(feature = "logging")]
        error!("block {address:#x} is not on a slot boundary");

        Self::BadBoundary { address }
    }

    pub fn multiple_free(address: usize) -> Self {
        #[cfg(feature = "logging")]
        error!("double free of block {address:#x}");

        Self::MultipleFree { address }
    }

    pub fn corrupted_block(address: usize, side: PadSide) -> Self {
        #[cfg(feature = "logging")]
        error!("{side} pad bytes of block {address:#x} overwritten");

        Self::CorruptedBlock { address, side }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// Result type for allocator operations
pub type AllocResult<T> = core::result::Result<T, AllocError>;

/// Short alias used by the prelude
pub type Result<T> = AllocResult<T>;
