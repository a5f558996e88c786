//! Standalone error types for substrate-memory
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.
//!
//! Three classes of failure are kept apart:
//! - capacity failures are returned as [`MemoryError`] values and are
//!   recoverable (or escalate through [`capacity_failure`] in fail-fast mode);
//! - usage-discipline violations go through [`usage_violation`], which never
//!   returns;
//! - dead resource handles surface as `None` from pool lookups.

use core::alloc::Layout;
use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    #[error("Invalid alignment: {alignment} (allocator guarantees {supported})")]
    InvalidAlignment { alignment: usize, supported: usize },

    // --- Pool Errors ---
    #[error("Memory pool '{pool_id}' exhausted (capacity: {capacity})")]
    PoolExhausted { pool_id: String, capacity: usize },

    // --- Arena Errors ---
    #[error("Arena '{arena_id}' exhausted: requested {requested} bytes, available {available}")]
    ArenaExhausted {
        arena_id: String,
        requested: usize,
        available: usize,
    },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl MemoryError {
    /// Check if error is retryable
    ///
    /// Capacity failures may succeed once the caller releases memory;
    /// configuration and layout errors never will.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailed { .. }
                | Self::PoolExhausted { .. }
                | Self::ArenaExhausted { .. }
        )
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::PoolExhausted { .. } => "MEM:POOL:EXHAUSTED",
            Self::ArenaExhausted { .. } => "MEM:ARENA:EXHAUSTED",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(size, align, "memory allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create allocation failed error from layout
    pub fn allocation_failed_with_layout(layout: Layout) -> Self {
        Self::allocation_failed(layout.size(), layout.align())
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create invalid alignment error
    pub fn invalid_alignment(alignment: usize, supported: usize) -> Self {
        Self::InvalidAlignment {
            alignment,
            supported,
        }
    }

    /// Create pool exhausted error
    pub fn pool_exhausted(pool_id: &str, capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(pool_id, capacity, "memory pool exhausted");

        Self::PoolExhausted {
            pool_id: pool_id.to_string(),
            capacity,
        }
    }

    /// Create arena exhausted error
    pub fn arena_exhausted(arena_id: &str, requested: usize, available: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(arena_id, requested, available, "arena exhausted");

        Self::ArenaExhausted {
            arena_id: arena_id.to_string(),
            requested,
            available,
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Check if this is an invalid alignment error
    #[must_use]
    pub fn is_invalid_alignment(&self) -> bool {
        matches!(self, Self::InvalidAlignment { .. })
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

/// Type aliases for allocator module
pub type AllocError = MemoryError;
pub type AllocResult<T> = MemoryResult<T>;

// ============================================================================
// Fatal paths
// ============================================================================

/// Reports a broken caller invariant and aborts the current operation.
///
/// Used for out-of-order stack deallocation, double frees of pool ids and
/// similar misuse. The allocator state is never touched before this is called.
#[cold]
#[track_caller]
pub fn usage_violation(component: &str, details: &str) -> ! {
    #[cfg(feature = "logging")]
    error!(component, details, "usage violation");

    panic!("{component}: usage violation: {details}")
}

/// Routes a capacity failure: returned as-is, or fatal when `fail_fast` is set.
#[track_caller]
pub fn capacity_failure(err: MemoryError, fail_fast: bool) -> MemoryError {
    if fail_fast {
        #[cfg(feature = "logging")]
        error!(code = err.code(), "fail-fast allocation failure: {err}");

        panic!("fail-fast: {err}");
    }
    err
}

// ============================================================================
// Tests
// ============================================================================
