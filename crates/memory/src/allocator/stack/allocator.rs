//! Main stack allocator implementation
//!
//! # Safety
//!
//! This module implements a single-threaded LIFO stack allocator:
//! - The buffer is a heap block aligned to `ALIGN`, owned by the allocator
//! - Offsets live in `Cell`s; the allocator is `Send` but not `Sync`
//! - Every block is preceded by an [`AllocationHeader`] holding the
//!   allocator state from before the block was handed out
//! - Only the most recent block may be released or grown
//!
//! ## Invariants
//!
//! - `0 <= prev_offset <= curr_offset <= CAPACITY`
//! - `prev_offset == 0` iff no block is live (blocks start at `>= HEADER_SIZE`)
//! - A failed or rejected call leaves both offsets unchanged

use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

use super::StackConfig;
use super::header::{AllocationHeader, HEADER_SIZE, StackBuffer};
use crate::allocator::stats::LocalCounters;
use crate::allocator::{
    AllocResult, Allocator, AllocatorStats, MemoryUsage, Resettable, StatisticsProvider,
};
use crate::error::{MemoryError, capacity_failure, usage_violation};
use crate::utils::{checked_align_up, is_aligned};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

const COMPONENT: &str = "StackAllocator";

/// Smallest supported `ALIGN`
pub const MIN_ALIGN: usize = 4;

/// Fixed-capacity stack allocator with LIFO deallocation
///
/// `CAPACITY` bytes are reserved once at construction. Blocks are carved
/// from the front by bumping an offset; releasing the most recent block rolls
/// the offset back using the header stored in front of it.
///
/// # Memory Layout
/// ```text
/// [0]--[hdr|block A]--[hdr|block B]--[hdr|block C]----[curr]----[CAPACITY]
///                                          ^ prev
/// ```
///
/// Deallocations must happen in reverse order: C, then B, then A. Releasing
/// anything other than the top block is a usage violation and panics.
///
/// # Examples
/// ```
/// use substrate_memory::allocator::{Allocator, StackAllocator};
///
/// let stack = StackAllocator::<256, 8>::new()?;
/// let a = stack.alloc(16)?;
/// let b = stack.alloc(32)?;
/// unsafe {
///     stack.dealloc(Some(b));
///     stack.dealloc(Some(a));
/// }
/// assert_eq!((stack.prev_offset(), stack.curr_offset()), (0, 0));
/// # Ok::<(), substrate_memory::MemoryError>(())
/// ```
pub struct StackAllocator<const CAPACITY: usize, const ALIGN: usize> {
    buffer: StackBuffer,
    prev_offset: Cell<usize>,
    curr_offset: Cell<usize>,
    config: StackConfig,
    counters: LocalCounters,
}

impl<const CAPACITY: usize, const ALIGN: usize> StackAllocator<CAPACITY, ALIGN> {
    /// Creates a new stack allocator with default configuration
    pub fn new() -> AllocResult<Self> {
        Self::with_config(StackConfig::default())
    }

    /// Creates a production-optimized stack allocator
    pub fn production() -> AllocResult<Self> {
        Self::with_config(StackConfig::production())
    }

    /// Creates a stack allocator that aborts when it runs out of capacity
    pub fn fail_fast() -> AllocResult<Self> {
        Self::with_config(StackConfig::fail_fast())
    }

    /// Creates a new stack allocator with custom configuration
    ///
    /// Fails with [`MemoryError::InvalidConfig`] unless `ALIGN` is a power of
    /// two of at least [`MIN_ALIGN`], and `CAPACITY` is a non-zero multiple of
    /// `ALIGN` no larger than `u32::MAX`.
    pub fn with_config(config: StackConfig) -> AllocResult<Self> {
        Self::validate_params()?;
        let buffer = StackBuffer::new(CAPACITY, ALIGN)?;

        #[cfg(feature = "logging")]
        debug!(capacity = CAPACITY, align = ALIGN, ?config, "stack allocator created");

        Ok(Self {
            buffer,
            prev_offset: Cell::new(0),
            curr_offset: Cell::new(0),
            config,
            counters: LocalCounters::default(),
        })
    }

    fn validate_params() -> AllocResult<()> {
        if !ALIGN.is_power_of_two() {
            return Err(MemoryError::invalid_config(&format!(
                "stack alignment {ALIGN} is not a power of two"
            )));
        }
        if ALIGN < MIN_ALIGN {
            return Err(MemoryError::invalid_config(&format!(
                "stack alignment {ALIGN} is below the minimum of {MIN_ALIGN}"
            )));
        }
        if CAPACITY == 0 {
            return Err(MemoryError::invalid_config("stack capacity cannot be zero"));
        }
        if CAPACITY % ALIGN != 0 {
            return Err(MemoryError::invalid_config(&format!(
                "stack capacity {CAPACITY} is not a multiple of alignment {ALIGN}"
            )));
        }
        if u32::try_from(CAPACITY).is_err() {
            return Err(MemoryError::invalid_config(&format!(
                "stack capacity {CAPACITY} exceeds u32::MAX"
            )));
        }
        Ok(())
    }

    /// Returns the total capacity of the allocator
    #[inline]
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Offset of the most recent live block, `0` when none is live
    #[inline]
    pub fn prev_offset(&self) -> usize {
        self.prev_offset.get()
    }

    /// End of the used region
    #[inline]
    pub fn curr_offset(&self) -> usize {
        self.curr_offset.get()
    }

    /// Returns the amount of memory currently in use, headers and padding included
    #[inline]
    pub fn used(&self) -> usize {
        self.curr_offset.get()
    }

    /// Returns the amount of memory left at the top of the stack
    #[inline]
    pub fn available(&self) -> usize {
        CAPACITY - self.curr_offset.get()
    }

    /// Whether no block is live
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prev_offset.get() == 0
    }

    /// Whether `ptr` points into this allocator's buffer
    #[inline]
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.buffer.offset_of(ptr).is_some()
    }

    /// Whether `ptr` is the most recent live block
    #[inline]
    pub fn is_top(&self, ptr: NonNull<u8>) -> bool {
        !self.is_empty() && self.buffer.offset_of(ptr) == Some(self.prev_offset.get())
    }

    /// Returns the configuration
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Releases every live block at once in O(1)
    ///
    /// All previously returned pointers become dangling. Nothing is read from
    /// or written to them afterwards by the allocator itself.
    pub fn dealloc_all(&self) {
        #[cfg(feature = "logging")]
        trace!(used = self.used(), "stack allocator reset");

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: [0, curr) is inside the buffer
            unsafe { self.buffer.fill(0, self.curr_offset.get(), pattern) };
        }
        self.prev_offset.set(0);
        self.curr_offset.set(0);
    }

    /// Bumps a new block of `size` bytes off the top
    fn push(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let prev = self.prev_offset.get();
        let curr = self.curr_offset.get();

        let bounds = curr
            .checked_add(HEADER_SIZE)
            .and_then(|start| checked_align_up(start, ALIGN))
            .and_then(|offset| Some((offset, offset.checked_add(size)?)))
            .filter(|&(_, end)| end <= CAPACITY);

        let Some((offset, end)) = bounds else {
            return Err(self.exhausted(size));
        };
        debug_assert!(is_aligned(offset, ALIGN));

        // SAFETY: HEADER_SIZE <= offset <= end <= CAPACITY
        unsafe {
            self.buffer
                .write_header(offset, AllocationHeader::new(prev, curr));
            if let Some(pattern) = self.config.alloc_pattern {
                self.buffer.fill(offset, end, pattern);
            }
        }
        self.prev_offset.set(offset);
        self.curr_offset.set(end);

        if self.config.track_stats {
            self.counters.record_alloc(end);
        }

        #[cfg(feature = "logging")]
        trace!(size, offset, end, "stack alloc");

        // SAFETY: offset <= CAPACITY
        Ok(unsafe { self.buffer.ptr_at(offset) })
    }

    /// Rolls back the top block; `ptr` must be it
    fn pop(&self, ptr: NonNull<u8>) {
        let offset = self.offset_or_violation(ptr);
        let top = self.prev_offset.get();

        if top == 0 {
            usage_violation(
                COMPONENT,
                &format!("dealloc of block at offset {offset} while no block is live"),
            );
        }
        if offset != top {
            usage_violation(
                COMPONENT,
                &format!(
                    "out-of-order dealloc: block at offset {offset} is not the \
                     most recent allocation (top is at offset {top})"
                ),
            );
        }

        // SAFETY: `offset` is the live top block, so its header was written by `push`
        let header = unsafe { self.buffer.read_header(offset) };
        debug_assert!(header.curr_offset() <= offset - HEADER_SIZE);

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: [offset, curr) is the block being released
            unsafe { self.buffer.fill(offset, self.curr_offset.get(), pattern) };
        }
        self.prev_offset.set(header.prev_offset());
        self.curr_offset.set(header.curr_offset());

        if self.config.track_stats {
            self.counters.record_dealloc();
        }

        #[cfg(feature = "logging")]
        trace!(
            offset,
            prev = header.prev_offset(),
            curr = header.curr_offset(),
            "stack dealloc"
        );
    }

    /// Resizes the top block in place
    fn resize_top(
        &self,
        ptr: NonNull<u8>,
        offset: usize,
        new_size: usize,
    ) -> AllocResult<NonNull<u8>> {
        let Some(end) = offset.checked_add(new_size).filter(|&end| end <= CAPACITY) else {
            return Err(self.exhausted(new_size));
        };

        let old_end = self.curr_offset.get();
        // SAFETY: both ranges lie within [offset, CAPACITY)
        unsafe {
            match (self.config.alloc_pattern, self.config.dealloc_pattern) {
                (Some(pattern), _) if end > old_end => self.buffer.fill(old_end, end, pattern),
                (_, Some(pattern)) if end < old_end => self.buffer.fill(end, old_end, pattern),
                _ => {}
            }
        }
        self.curr_offset.set(end);

        if self.config.track_stats {
            self.counters.record_realloc(end);
        }

        #[cfg(feature = "logging")]
        trace!(offset, old_end, end, "stack realloc in place");

        Ok(ptr)
    }

    fn offset_or_violation(&self, ptr: NonNull<u8>) -> usize {
        match self.buffer.offset_of(ptr) {
            Some(offset) => offset,
            None => usage_violation(
                COMPONENT,
                &format!("{ptr:p} was not allocated by this stack allocator"),
            ),
        }
    }

    #[cold]
    fn exhausted(&self, requested: usize) -> MemoryError {
        if self.config.track_stats {
            self.counters.record_failure();
        }
        capacity_failure(
            MemoryError::arena_exhausted(COMPONENT, requested, self.available()),
            self.config.fail_fast,
        )
    }
}

// SAFETY: blocks are carved from disjoint ranges of an ALIGN-aligned buffer at
// ALIGN-aligned offsets; a failed resize leaves the block untouched.
unsafe impl<const CAPACITY: usize, const ALIGN: usize> Allocator
    for StackAllocator<CAPACITY, ALIGN>
{
    #[inline]
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        self.push(size)
    }

    /// Resizes a block
    ///
    /// - the top block grows or shrinks in place by moving `curr_offset`
    /// - any other block may shrink or keep its size (same pointer, space is
    ///   reclaimed once it becomes the top and is released)
    /// - growing any other block is a usage violation
    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        old_size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let Some(ptr) = ptr else {
            return self.push(new_size).map(Some);
        };

        if new_size == 0 {
            self.pop(ptr);
            return Ok(None);
        }

        let offset = self.offset_or_violation(ptr);
        let top = self.prev_offset.get();

        if top != 0 && offset == top {
            return self.resize_top(ptr, offset, new_size).map(Some);
        }

        if top == 0 || offset > top {
            usage_violation(
                COMPONENT,
                &format!(
                    "realloc of block at offset {offset} which is not live \
                     (top is at offset {top})"
                ),
            );
        }
        if new_size > old_size {
            usage_violation(
                COMPONENT,
                &format!(
                    "cannot grow block at offset {offset} from {old_size} to \
                     {new_size} bytes: not the most recent allocation"
                ),
            );
        }
        Ok(Some(ptr))
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: Option<NonNull<u8>>) {
        if let Some(ptr) = ptr {
            self.pop(ptr);
        }
    }

    #[inline]
    fn alignment(&self) -> usize {
        ALIGN
    }

    #[inline]
    fn is_fail_fast(&self) -> bool {
        self.config.fail_fast
    }
}

impl<const CAPACITY: usize, const ALIGN: usize> MemoryUsage for StackAllocator<CAPACITY, ALIGN> {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.available())
    }

    fn total_memory(&self) -> Option<usize> {
        Some(CAPACITY)
    }
}

impl<const CAPACITY: usize, const ALIGN: usize> Resettable for StackAllocator<CAPACITY, ALIGN> {
    unsafe fn reset(&self) {
        self.dealloc_all();
        if self.config.track_stats {
            self.counters.reset();
        }
    }
}

impl<const CAPACITY: usize, const ALIGN: usize> StatisticsProvider
    for StackAllocator<CAPACITY, ALIGN>
{
    fn statistics(&self) -> AllocatorStats {
        self.counters.snapshot(self.used())
    }

    fn reset_statistics(&self) {
        self.counters.reset();
    }

    fn statistics_enabled(&self) -> bool {
        self.config.track_stats
    }
}

impl<const CAPACITY: usize, const ALIGN: usize> fmt::Debug for StackAllocator<CAPACITY, ALIGN> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackAllocator")
            .field("capacity", &CAPACITY)
            .field("align", &ALIGN)
            .field("prev_offset", &self.prev_offset.get())
            .field("curr_offset", &self.curr_offset.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    type Stack64 = StackAllocator<64, 8>;

    fn offsets<const C: usize, const A: usize>(stack: &StackAllocator<C, A>) -> (usize, usize) {
        (stack.prev_offset(), stack.curr_offset())
    }

    #[test]
    fn first_block_leaves_room_for_header() {
        let stack = Stack64::production().unwrap();
        let p = stack.alloc(16).unwrap();
        assert_eq!(stack.buffer.offset_of(p), Some(8));
        assert_eq!(offsets(&stack), (8, 24));
        assert_eq!(p.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn blocks_respect_large_alignment() {
        let stack = StackAllocator::<256, 32>::production().unwrap();
        let a = stack.alloc(3).unwrap();
        let b = stack.alloc(5).unwrap();
        assert_eq!(a.as_ptr() as usize % 32, 0);
        assert_eq!(b.as_ptr() as usize % 32, 0);
        assert_eq!(stack.buffer.offset_of(a), Some(32));
        assert_eq!(stack.buffer.offset_of(b), Some(64));
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert_eq!(
            StackAllocator::<64, 6>::new().unwrap_err().code(),
            "MEM:CONFIG:INVALID"
        );
        assert!(StackAllocator::<64, 2>::new().is_err());
        assert!(StackAllocator::<0, 8>::new().is_err());
        assert!(StackAllocator::<60, 8>::new().is_err());
        assert!(StackAllocator::<64, 4>::new().is_ok());
    }

    #[test]
    fn exhaustion_leaves_state_unchanged() {
        let stack = Stack64::production().unwrap();
        let _a = stack.alloc(40).unwrap();
        let before = offsets(&stack);

        let err = stack.alloc(16).unwrap_err();
        assert!(matches!(err, MemoryError::ArenaExhausted { requested: 16, .. }));
        assert_eq!(offsets(&stack), before);
    }

    #[test]
    fn huge_request_does_not_overflow() {
        let stack = Stack64::production().unwrap();
        assert!(stack.alloc(usize::MAX).is_err());
        assert_eq!(offsets(&stack), (0, 0));
    }

    #[test]
    fn zero_sized_block_obeys_lifo() {
        let stack = Stack64::production().unwrap();
        let a = stack.alloc(0).unwrap();
        let b = stack.alloc(0).unwrap();
        assert_ne!(a, b);
        unsafe {
            stack.dealloc(Some(b));
            stack.dealloc(Some(a));
        }
        assert_eq!(offsets(&stack), (0, 0));
    }

    #[test]
    fn dealloc_pattern_scrubs_released_block() {
        let stack = StackAllocator::<64, 8>::with_config(StackConfig::debug()).unwrap();
        let p = stack.alloc(8).unwrap();
        unsafe {
            assert_eq!(*p.as_ptr(), 0xCC);
            p.as_ptr().write_bytes(0x11, 8);
            stack.dealloc(Some(p));
            assert_eq!(*p.as_ptr(), 0xDD);
        }
    }

    #[test]
    fn top_block_grows_and_shrinks_in_place() {
        let stack = Stack64::production().unwrap();
        let p = stack.alloc(8).unwrap();
        unsafe {
            p.as_ptr().write_bytes(0x42, 8);
            let grown = stack.realloc(Some(p), 32, 8).unwrap().unwrap();
            assert_eq!(grown, p);
            assert_eq!(offsets(&stack), (8, 40));
            assert_eq!(*grown.as_ptr().add(7), 0x42);

            let shrunk = stack.realloc(Some(grown), 4, 32).unwrap().unwrap();
            assert_eq!(shrunk, p);
            assert_eq!(offsets(&stack), (8, 12));
        }
    }

    #[test]
    fn non_top_block_may_shrink_in_place() {
        let stack = Stack64::production().unwrap();
        let a = stack.alloc(16).unwrap();
        let _b = stack.alloc(8).unwrap();
        let before = offsets(&stack);
        let same = unsafe { stack.realloc(Some(a), 8, 16) }.unwrap().unwrap();
        assert_eq!(same, a);
        assert_eq!(offsets(&stack), before);
    }

    #[test]
    #[should_panic(expected = "cannot grow block")]
    fn non_top_block_cannot_grow() {
        let stack = Stack64::production().unwrap();
        let a = stack.alloc(8).unwrap();
        let _b = stack.alloc(8).unwrap();
        let _ = unsafe { stack.realloc(Some(a), 16, 8) };
    }

    #[test]
    fn foreign_pointer_is_a_violation_and_keeps_state() {
        let stack = Stack64::production().unwrap();
        let other = Stack64::production().unwrap();
        let _mine = stack.alloc(8).unwrap();
        let foreign = other.alloc(8).unwrap();
        let before = offsets(&stack);

        let result = catch_unwind(AssertUnwindSafe(|| unsafe {
            stack.dealloc(Some(foreign));
        }));
        assert!(result.is_err());
        assert_eq!(offsets(&stack), before);
    }

    #[test]
    #[should_panic(expected = "while no block is live")]
    fn dealloc_on_empty_stack_is_a_violation() {
        let stack = Stack64::production().unwrap();
        let p = stack.alloc(8).unwrap();
        stack.dealloc_all();
        unsafe { stack.dealloc(Some(p)) };
    }

    #[test]
    fn dealloc_all_resets_offsets() {
        let stack = Stack64::production().unwrap();
        stack.alloc(8).unwrap();
        stack.alloc(8).unwrap();
        stack.dealloc_all();
        assert_eq!(offsets(&stack), (0, 0));
        assert!(stack.is_empty());
        assert_eq!(stack.available(), 64);
    }

    #[test]
    fn statistics_follow_operations() {
        let stack = StackAllocator::<128, 8>::with_config(StackConfig::debug()).unwrap();
        let a = stack.alloc(16).unwrap();
        let b = stack.alloc(16).unwrap();
        let _ = stack.alloc(1024);
        unsafe {
            stack.dealloc(Some(b));
            stack.dealloc(Some(a));
        }

        let stats = stack.statistics();
        assert!(stack.statistics_enabled());
        assert_eq!(stats.allocation_count, 2);
        assert_eq!(stats.deallocation_count, 2);
        assert_eq!(stats.failed_allocations, 1);
        assert_eq!(stats.peak_allocated_bytes, 48);
        assert_eq!(stats.allocated_bytes, 0);
    }

    #[test]
    fn memory_usage_reports_capacity() {
        let stack = Stack64::production().unwrap();
        stack.alloc(8).unwrap();
        assert_eq!(stack.used_memory(), 16);
        assert_eq!(stack.total_memory(), Some(64));
        assert_eq!(stack.memory_usage_percent(), Some(25.0));
    }

    #[test]
    fn allocator_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Stack64>();
    }
}
