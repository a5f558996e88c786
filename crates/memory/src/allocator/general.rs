//! General-purpose allocator over the process heap
//!
//! Delegates every call to the C heap (`malloc` / `calloc` / `realloc` /
//! `free`). Holds no bookkeeping of its own, so `dealloc` needs no size and
//! `realloc` inherits the C guarantee that a failed resize leaves the original
//! block untouched.

use core::ptr::NonNull;

use super::{AllocResult, Allocator, MemoryUsage};
use crate::error::{MemoryError, capacity_failure};

#[cfg(feature = "logging")]
use tracing::trace;

/// Alignment `malloc` guarantees (`alignof(max_align_t)`)
#[cfg(target_pointer_width = "64")]
pub const HEAP_ALIGNMENT: usize = 16;
#[cfg(not(target_pointer_width = "64"))]
pub const HEAP_ALIGNMENT: usize = 8;

/// Wrapper for the process heap allocator
///
/// # Thread Safety
/// The C heap is thread-safe, so this allocator is `Send + Sync` and can be
/// shared freely.
///
/// # Zero-sized requests
/// `alloc(0)` reserves a one-byte block, so every returned pointer is unique
/// and can be released with `dealloc` like any other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneralAllocator {
    fail_fast: bool,
}

impl GeneralAllocator {
    /// Creates a general allocator that reports failures as `Err`
    #[inline]
    pub const fn new() -> Self {
        Self { fail_fast: false }
    }

    /// Creates a general allocator that aborts on allocation failure
    #[inline]
    pub const fn fail_fast() -> Self {
        Self { fail_fast: true }
    }

    #[cold]
    fn failure(&self, size: usize) -> MemoryError {
        capacity_failure(
            MemoryError::allocation_failed(size, HEAP_ALIGNMENT),
            self.fail_fast,
        )
    }
}

// SAFETY: malloc/calloc/realloc return blocks aligned to max_align_t that stay
// valid until freed; realloc leaves the input intact on failure.
unsafe impl Allocator for GeneralAllocator {
    #[inline]
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        // SAFETY: malloc accepts any size; null is handled below
        let raw = unsafe { libc::malloc(size.max(1)) };

        #[cfg(feature = "logging")]
        trace!(size, ptr = ?raw, "general alloc");

        NonNull::new(raw.cast::<u8>()).ok_or_else(|| self.failure(size))
    }

    #[inline]
    fn alloc_zeroed(&self, size: usize) -> AllocResult<NonNull<u8>> {
        // SAFETY: calloc with a single element of `size` bytes cannot overflow
        let raw = unsafe { libc::calloc(1, size.max(1)) };
        NonNull::new(raw.cast::<u8>()).ok_or_else(|| self.failure(size))
    }

    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        _old_size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let Some(old) = ptr else {
            return self.alloc(new_size).map(Some);
        };

        if new_size == 0 {
            // SAFETY: forwarded caller contract
            unsafe { self.dealloc(Some(old)) };
            return Ok(None);
        }

        // SAFETY: `old` came from this heap (caller contract). On null the
        // original block is still owned by the caller.
        let raw = unsafe { libc::realloc(old.as_ptr().cast(), new_size) };

        #[cfg(feature = "logging")]
        trace!(new_size, from = ?old, to = ?raw, "general realloc");

        NonNull::new(raw.cast::<u8>())
            .map(Some)
            .ok_or_else(|| self.failure(new_size))
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: Option<NonNull<u8>>) {
        if let Some(ptr) = ptr {
            // SAFETY: `ptr` is a live heap block (caller contract)
            unsafe { libc::free(ptr.as_ptr().cast()) };
        }
    }

    #[inline]
    fn alignment(&self) -> usize {
        HEAP_ALIGNMENT
    }

    #[inline]
    fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }
}

// The heap does not report per-allocator usage
impl MemoryUsage for GeneralAllocator {
    fn used_memory(&self) -> usize {
        0
    }

    fn available_memory(&self) -> Option<usize> {
        None
    }
}
