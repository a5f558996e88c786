//! The allocator capability contract
//!
//! Every allocator in this crate, and every allocator a container is generic
//! over, implements [`Allocator`]. The contract is deliberately small:
//! - `alloc` / `alloc_zeroed` hand out raw blocks of at least `size` bytes
//! - `realloc` resizes with standard reallocation semantics
//! - `dealloc` releases a block (no-op for `None`)
//!
//! Sizes are not tracked globally. Callers pass the old size to `realloc`.
//!
//! # Safety
//!
//! ## Trait Safety Contracts
//!
//! Implementors of [`Allocator`] must guarantee:
//! - a returned block is valid for reads and writes of `size` bytes
//! - a returned block is aligned to at least [`Allocator::alignment`]
//! - live blocks never overlap
//! - on a failed `realloc` the original block stays valid and unchanged
//!
//! ## Failure Signalling
//!
//! Capacity failures come back as `Err(MemoryError)`. They never panic unless
//! the allocator runs in fail-fast mode ([`Allocator::is_fail_fast`]), in which
//! case the failure is escalated through [`crate::error::capacity_failure`].
//!
//! ## Blanket Implementation Safety
//!
//! The blanket impl for `&A` forwards every call to `A`, so the contract is
//! preserved through delegation.

use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};

use crate::error::{AllocError, AllocResult};
use crate::utils::array_size;

/// Uniform allocator capability contract
///
/// Allocation methods take `&self`; allocators with state use interior
/// mutability. None of the allocators in this crate are required to be
/// `Sync`, so concurrent use needs external locking.
///
/// # Safety
///
/// Implementors must uphold the contracts listed in the module docs.
pub unsafe trait Allocator {
    /// Allocates an uninitialized block of at least `size` bytes
    ///
    /// `alloc(0)` is implementation-defined but always returns a pointer that
    /// can be passed back to [`dealloc`](Self::dealloc).
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Allocates a block of at least `size` bytes with every byte zeroed
    fn alloc_zeroed(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let ptr = self.alloc(size)?;
        // SAFETY: alloc returned a block valid for writes of `size` bytes
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Resizes a block
    ///
    /// - `ptr == None` behaves as `alloc(new_size)`
    /// - `new_size == 0` behaves as `dealloc(ptr)` and returns `Ok(None)`
    /// - on success the first `min(old_size, new_size)` bytes are preserved
    /// - on failure `ptr` is still valid and its contents are untouched
    ///
    /// The default implementation allocates, copies and releases.
    ///
    /// # Safety
    /// - `ptr`, if present, must be a live block from this allocator
    /// - `old_size` must not exceed the size the block was obtained with
    /// - on success the old pointer must no longer be used unless it is the
    ///   returned one
    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        old_size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let Some(old) = ptr else {
            return self.alloc(new_size).map(Some);
        };

        if new_size == 0 {
            // SAFETY: forwarded caller contract
            unsafe { self.dealloc(Some(old)) };
            return Ok(None);
        }

        let new = self.alloc(new_size)?;
        // SAFETY:
        // - `old` is valid for `old_size` reads (caller contract)
        // - `new` was just allocated, valid for `new_size` writes
        // - both blocks are live at once, so they cannot overlap
        unsafe {
            ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_size.min(new_size));
            self.dealloc(Some(old));
        }
        Ok(Some(new))
    }

    /// Releases a block; `None` is a no-op
    ///
    /// # Safety
    /// `ptr`, if present, must be a live block obtained from this allocator.
    unsafe fn dealloc(&self, ptr: Option<NonNull<u8>>);

    /// Alignment every returned block is guaranteed to satisfy
    fn alignment(&self) -> usize;

    /// Whether capacity failures abort instead of returning `Err`
    fn is_fail_fast(&self) -> bool {
        false
    }
}

// SAFETY: pure delegation to `A`
unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        (**self).alloc(size)
    }

    #[inline]
    fn alloc_zeroed(&self, size: usize) -> AllocResult<NonNull<u8>> {
        (**self).alloc_zeroed(size)
    }

    #[inline]
    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        old_size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        // SAFETY: forwarded caller contract
        unsafe { (**self).realloc(ptr, new_size, old_size) }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: Option<NonNull<u8>>) {
        // SAFETY: forwarded caller contract
        unsafe { (**self).dealloc(ptr) }
    }

    #[inline]
    fn alignment(&self) -> usize {
        (**self).alignment()
    }

    #[inline]
    fn is_fail_fast(&self) -> bool {
        (**self).is_fail_fast()
    }
}

/// Typed convenience layer over the four [`Allocator`] primitives
///
/// Layout is derived from `T`. Types whose alignment exceeds
/// [`Allocator::alignment`] are rejected with
/// [`MemoryError::InvalidAlignment`](crate::MemoryError::InvalidAlignment).
pub trait TypedAllocator: Allocator {
    /// Fails if `T` needs stricter alignment than this allocator provides
    #[inline]
    fn check_alignment<T>(&self) -> AllocResult<()> {
        if align_of::<T>() > self.alignment() {
            return Err(AllocError::invalid_alignment(
                align_of::<T>(),
                self.alignment(),
            ));
        }
        Ok(())
    }

    /// Allocates a block for one `T` and moves `value` into it
    fn alloc_value<T>(&self, value: T) -> AllocResult<NonNull<T>> {
        self.check_alignment::<T>()?;
        let ptr = self.alloc(size_of::<T>())?.cast::<T>();
        // SAFETY: fresh block, sized and aligned for T (checked above)
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Allocates uninitialized storage for `count` values of `T`
    fn alloc_array<T>(&self, count: usize) -> AllocResult<NonNull<T>> {
        self.check_alignment::<T>()?;
        let size = array_size::<T>(count).ok_or_else(|| AllocError::size_overflow("alloc_array"))?;
        Ok(self.alloc(size)?.cast())
    }

    /// Allocates zeroed storage for `count` values of `T`
    fn alloc_array_zeroed<T>(&self, count: usize) -> AllocResult<NonNull<T>> {
        self.check_alignment::<T>()?;
        let size = array_size::<T>(count)
            .ok_or_else(|| AllocError::size_overflow("alloc_array_zeroed"))?;
        Ok(self.alloc_zeroed(size)?.cast())
    }

    /// Resizes an array block from `old_count` to `new_count` elements
    ///
    /// Elements are moved bitwise; none are dropped or initialized.
    ///
    /// # Safety
    /// Same as [`Allocator::realloc`], with `old_count` elements of `T`.
    unsafe fn realloc_array<T>(
        &self,
        ptr: Option<NonNull<T>>,
        old_count: usize,
        new_count: usize,
    ) -> AllocResult<Option<NonNull<T>>> {
        self.check_alignment::<T>()?;
        let new_size =
            array_size::<T>(new_count).ok_or_else(|| AllocError::size_overflow("realloc_array"))?;
        let old_size = array_size::<T>(old_count).unwrap_or(usize::MAX);
        // SAFETY: forwarded caller contract
        let raw = unsafe { self.realloc(ptr.map(NonNull::cast), new_size, old_size)? };
        Ok(raw.map(NonNull::cast))
    }

    /// Drops the value in place, then releases its block
    ///
    /// # Safety
    /// `ptr` must come from [`alloc_value`](Self::alloc_value) on this
    /// allocator and hold an initialized `T`.
    unsafe fn dealloc_value<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller guarantees an initialized T we own
        unsafe {
            ptr::drop_in_place(ptr.as_ptr());
            self.dealloc(Some(ptr.cast()));
        }
    }

    /// Releases an array block without dropping its elements
    ///
    /// # Safety
    /// `ptr` must come from an array allocation on this allocator.
    unsafe fn dealloc_array<T>(&self, ptr: NonNull<T>) {
        // SAFETY: forwarded caller contract
        unsafe { self.dealloc(Some(ptr.cast())) };
    }
}

impl<A: Allocator + ?Sized> TypedAllocator for A {}

/// Memory usage tracking trait
///
/// Implemented by allocators that know how much of their capacity is in use.
pub trait MemoryUsage {
    /// Get currently used memory in bytes
    fn used_memory(&self) -> usize;

    /// Get available memory in bytes (if known)
    fn available_memory(&self) -> Option<usize>;

    /// Get total memory capacity in bytes (if known)
    fn total_memory(&self) -> Option<usize> {
        self.available_memory()
            .map(|available| self.used_memory() + available)
    }

    /// Returns memory usage as a percentage (0.0 to 100.0)
    fn memory_usage_percent(&self) -> Option<f32> {
        self.total_memory().map(|total| {
            if total == 0 {
                0.0
            } else {
                (self.used_memory() as f32 / total as f32) * 100.0
            }
        })
    }
}

/// Allocators that can drop every live allocation at once
pub trait Resettable {
    /// Reset allocator to initial state
    ///
    /// # Safety
    /// Every pointer handed out before the reset becomes dangling. The caller
    /// must ensure none of them is used afterwards.
    unsafe fn reset(&self);
}
