//! Backing buffer and per-allocation headers for the stack allocator
//!
//! All raw pointer arithmetic of the stack allocator lives here. The rest of
//! the allocator works in offsets and calls these helpers with offsets it has
//! already bounds-checked.
//!
//! # Layout
//! ```text
//! base                                   offset          offset+size
//!  |  ...earlier blocks...  | pad | header |    block      |   free   |
//!                                  ^ 8 bytes: state before this block
//! ```

use core::alloc::Layout;
use core::mem::size_of;
use core::ptr::NonNull;

use crate::error::{AllocResult, MemoryError};

/// Allocator state captured immediately before an allocation
///
/// Stored in the bytes preceding every block so `dealloc` can roll the
/// allocator back in O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct AllocationHeader {
    prev_offset: u32,
    curr_offset: u32,
}

/// Bytes reserved in front of every block
pub const HEADER_SIZE: usize = size_of::<AllocationHeader>();

impl AllocationHeader {
    /// Captures `(prev_offset, curr_offset)`; both must fit the `u32` range
    /// the allocator enforces on its capacity.
    pub(crate) fn new(prev_offset: usize, curr_offset: usize) -> Self {
        debug_assert!(prev_offset <= curr_offset);
        debug_assert!(u32::try_from(curr_offset).is_ok());
        Self {
            prev_offset: prev_offset as u32,
            curr_offset: curr_offset as u32,
        }
    }

    /// Offset of the block that was on top before this one
    pub fn prev_offset(&self) -> usize {
        self.prev_offset as usize
    }

    /// End of the used region before this block
    pub fn curr_offset(&self) -> usize {
        self.curr_offset as usize
    }
}

/// Heap block owned exclusively by one stack allocator, aligned to its `ALIGN`
pub(crate) struct StackBuffer {
    base: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the buffer is uniquely owned; moving it between threads moves
// ownership of the whole block
unsafe impl Send for StackBuffer {}

impl StackBuffer {
    /// Reserves `capacity` zeroed bytes aligned to `align`
    ///
    /// `capacity` must be non-zero.
    pub(crate) fn new(capacity: usize, align: usize) -> AllocResult<Self> {
        debug_assert!(capacity > 0);
        let layout = Layout::from_size_align(capacity, align).map_err(|_| {
            MemoryError::invalid_config("capacity and alignment do not form a layout")
        })?;

        // SAFETY: layout has non-zero size
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let base =
            NonNull::new(raw).ok_or_else(|| MemoryError::allocation_failed_with_layout(layout))?;

        Ok(Self { base, layout })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    /// Offset of `ptr` inside the buffer, including the one-past-end address
    #[inline]
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        (ptr.as_ptr() as usize)
            .checked_sub(self.base.as_ptr() as usize)
            .filter(|&offset| offset <= self.len())
    }

    /// # Safety
    /// `offset <= self.len()`
    #[inline]
    pub(crate) unsafe fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.len());
        // SAFETY: in bounds or one past the end (caller contract)
        unsafe { self.base.add(offset) }
    }

    /// # Safety
    /// `HEADER_SIZE <= offset <= self.len()`
    #[inline]
    pub(crate) unsafe fn write_header(&self, offset: usize, header: AllocationHeader) {
        debug_assert!(offset >= HEADER_SIZE && offset <= self.len());
        // SAFETY: the header slot [offset - HEADER_SIZE, offset) is in bounds
        unsafe {
            self.ptr_at(offset - HEADER_SIZE)
                .cast::<AllocationHeader>()
                .as_ptr()
                .write_unaligned(header);
        }
    }

    /// # Safety
    /// A header must have been written for `offset`
    #[inline]
    pub(crate) unsafe fn read_header(&self, offset: usize) -> AllocationHeader {
        debug_assert!(offset >= HEADER_SIZE && offset <= self.len());
        // SAFETY: the header slot is in bounds and initialized (caller contract)
        unsafe {
            self.ptr_at(offset - HEADER_SIZE)
                .cast::<AllocationHeader>()
                .as_ptr()
                .read_unaligned()
        }
    }

    /// Fills `[start, end)` with `byte`
    ///
    /// # Safety
    /// `start <= end <= self.len()` and no live Rust reference covers the range
    #[inline]
    pub(crate) unsafe fn fill(&self, start: usize, end: usize, byte: u8) {
        debug_assert!(start <= end && end <= self.len());
        // SAFETY: range in bounds (caller contract)
        unsafe { self.ptr_at(start).as_ptr().write_bytes(byte, end - start) };
    }
}

impl Drop for StackBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with exactly this layout
        unsafe { std::alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}
