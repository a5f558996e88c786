//! Growable array over any [`Allocator`]
//!
//! Backing storage is obtained and resized exclusively through the allocator
//! contract, so the same vector type runs on the process heap or inside a
//! [`StackAllocator`](crate::allocator::StackAllocator).
//!
//! On a stack allocator the vector can only grow while its block is the most
//! recent allocation, and must be dropped in LIFO order like any other block.

use core::fmt;
use core::marker::PhantomData;
use core::mem::size_of;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use crate::allocator::{AllocResult, Allocator, GeneralAllocator, TypedAllocator};
use crate::error::MemoryError;
use crate::utils::array_size;

#[cfg(feature = "logging")]
use tracing::trace;

/// Capacity of the first non-empty allocation
const MIN_CAPACITY: usize = 4;

/// Growable array that allocates through `A`
///
/// All fallible operations return the allocator's error and leave the vector
/// untouched on failure.
///
/// # Examples
/// ```
/// use substrate_memory::collections::AllocVec;
///
/// let mut v = AllocVec::new();
/// v.try_push(1u32)?;
/// v.try_push(2)?;
/// assert_eq!(v.as_slice(), &[1, 2]);
/// # Ok::<(), substrate_memory::MemoryError>(())
/// ```
pub struct AllocVec<T, A: Allocator = GeneralAllocator> {
    ptr: NonNull<T>,
    cap: usize,
    len: usize,
    alloc: A,
    _marker: PhantomData<T>,
}

// SAFETY: the vector owns its elements; the raw pointer is never shared
unsafe impl<T: Send, A: Allocator + Send> Send for AllocVec<T, A> {}
// SAFETY: `&AllocVec` only hands out `&T` and `&A`
unsafe impl<T: Sync, A: Allocator + Sync> Sync for AllocVec<T, A> {}

impl<T> AllocVec<T> {
    /// Creates an empty vector on the process heap
    pub fn new() -> Self {
        Self::new_in(GeneralAllocator::new())
    }
}

impl<T> Default for AllocVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> AllocVec<T, A> {
    const IS_ZST: bool = size_of::<T>() == 0;

    /// Creates an empty vector; nothing is allocated until the first push
    pub fn new_in(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            cap: if Self::IS_ZST { usize::MAX } else { 0 },
            len: 0,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Creates an empty vector with room for at least `capacity` elements
    pub fn with_capacity_in(capacity: usize, alloc: A) -> AllocResult<Self> {
        let mut vec = Self::new_in(alloc);
        vec.try_reserve(capacity)?;
        Ok(vec)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Returns the allocator backing this vector
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Ensures room for `additional` more elements
    ///
    /// Grows to the larger of twice the current capacity and the required
    /// length.
    pub fn try_reserve(&mut self, additional: usize) -> AllocResult<()> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or_else(|| MemoryError::size_overflow("AllocVec::try_reserve"))?;
        if required <= self.cap {
            return Ok(());
        }
        let new_cap = required
            .max(self.cap.saturating_mul(2))
            .max(MIN_CAPACITY);
        self.grow_to(new_cap)
    }

    fn grow_to(&mut self, new_cap: usize) -> AllocResult<()> {
        debug_assert!(!Self::IS_ZST && new_cap > self.cap);
        let old = (self.cap > 0).then_some(self.ptr);

        // SAFETY: `old` is the live block of `cap` elements owned by this vector
        let grown = unsafe { self.alloc.realloc_array::<T>(old, self.cap, new_cap)? };
        let ptr = grown.ok_or_else(|| {
            MemoryError::allocation_failed(
                array_size::<T>(new_cap).unwrap_or(usize::MAX),
                self.alloc.alignment(),
            )
        })?;

        #[cfg(feature = "logging")]
        trace!(old_cap = self.cap, new_cap, "AllocVec grow");

        self.ptr = ptr;
        self.cap = new_cap;
        Ok(())
    }

    /// Appends `value`, growing the storage if needed
    ///
    /// On failure `value` is dropped and the vector is unchanged.
    pub fn try_push(&mut self, value: T) -> AllocResult<()> {
        if self.len == self.cap {
            self.try_reserve(1)?;
        }
        // SAFETY: len < cap, so the slot is inside the allocation
        unsafe { self.ptr.add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the last element
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the element at `len` was initialized and is now outside the live range
        Some(unsafe { self.ptr.add(self.len).read() })
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: [0, len) is initialized; ptr is dangling-but-aligned when empty
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`, with unique access through `&mut self`
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Drops every element, keeping the storage
    pub fn clear(&mut self) {
        let elems = ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        // Length first so a panicking destructor cannot cause a double drop
        self.len = 0;
        // SAFETY: the slice covered exactly the initialized elements
        unsafe { ptr::drop_in_place(elems) };
    }
}

impl<T, A: Allocator> Drop for AllocVec<T, A> {
    fn drop(&mut self) {
        self.clear();
        if !Self::IS_ZST && self.cap > 0 {
            // SAFETY: the block came from `realloc_array` on this allocator
            unsafe { self.alloc.dealloc_array(self.ptr) };
        }
    }
}

impl<T, A: Allocator> Deref for AllocVec<T, A> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> DerefMut for AllocVec<T, A> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for AllocVec<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::allocator::{StackAllocator, StackConfig};

    #[test]
    fn push_pop_and_growth() {
        let mut v = AllocVec::new();
        for i in 0..100u64 {
            v.try_push(i).unwrap();
        }
        assert_eq!(v.len(), 100);
        assert!(v.capacity() >= 100);
        assert_eq!(v.get(42), Some(&42));
        assert_eq!(v.iter().sum::<u64>(), 4950);
        assert_eq!(v.pop(), Some(99));
        assert_eq!(v.len(), 99);
    }

    #[test]
    fn with_capacity_reserves_up_front() {
        let v = AllocVec::<u32>::with_capacity_in(10, GeneralAllocator::new()).unwrap();
        assert_eq!(v.capacity(), 10);
        assert!(v.is_empty());
    }

    #[test]
    fn grows_in_place_on_stack_allocator() {
        let stack = StackAllocator::<256, 8>::with_config(StackConfig::production()).unwrap();
        let mut v = AllocVec::<u64, _>::new_in(&stack);
        for i in 0..10 {
            v.try_push(i).unwrap();
        }
        assert_eq!(stack.prev_offset(), 8);
        assert_eq!(v.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        drop(v);
        assert_eq!((stack.prev_offset(), stack.curr_offset()), (0, 0));
    }

    #[test]
    fn failed_growth_keeps_contents() {
        let stack = StackAllocator::<64, 8>::with_config(StackConfig::production()).unwrap();
        let mut v = AllocVec::<u64, _>::new_in(&stack);
        for i in 0..4 {
            v.try_push(i).unwrap();
        }
        let err = v.try_push(4).unwrap_err();
        assert_eq!(err.code(), "MEM:ARENA:EXHAUSTED");
        assert_eq!(v.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(v.capacity(), 4);
    }

    #[test]
    fn zero_sized_elements_never_allocate() {
        let stack = StackAllocator::<64, 8>::with_config(StackConfig::production()).unwrap();
        let mut v = AllocVec::<(), _>::new_in(&stack);
        for _ in 0..1000 {
            v.try_push(()).unwrap();
        }
        assert_eq!(v.len(), 1000);
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn drop_and_clear_run_destructors() {
        let marker = Rc::new(());
        let mut v = AllocVec::new();
        for _ in 0..5 {
            v.try_push(Rc::clone(&marker)).unwrap();
        }
        assert_eq!(Rc::strong_count(&marker), 6);
        v.clear();
        assert_eq!(Rc::strong_count(&marker), 1);

        v.try_push(Rc::clone(&marker)).unwrap();
        drop(v);
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn overflowing_reserve_is_an_error() {
        let mut v = AllocVec::<u8>::new();
        v.try_push(1).unwrap();
        assert_eq!(
            v.try_reserve(usize::MAX).unwrap_err().code(),
            "MEM:ALLOC:OVERFLOW"
        );
        assert_eq!(v.as_slice(), &[1]);
    }
}
