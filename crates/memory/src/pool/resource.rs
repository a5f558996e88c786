//! Slot table with generational ids
//!
//! # Slot lifecycle
//! ```text
//!   alloc_init            free (generation += 1)
//! Free ──────────► Occupied ──────────────────► Free ──► (reused by alloc_init)
//! ```
//!
//! A [`ResourceId`] carries the generation of the slot at the time it was
//! handed out. Freeing a slot bumps its generation, so every id issued for an
//! earlier occupant stops resolving, even after the slot is reused.

use core::fmt;
use core::mem::{self, ManuallyDrop};

use super::PoolConfig;
use crate::allocator::{AllocResult, Allocator, GeneralAllocator};
use crate::collections::AllocVec;
use crate::error::{MemoryError, capacity_failure, usage_violation};

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

const COMPONENT: &str = "ResourcePool";

/// Handle to a value stored in a [`ResourcePool`]
///
/// Small and `Copy`; all copies refer to the same slot. Packs into a `u64`
/// with [`to_raw`](Self::to_raw) when it has to cross an integer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    index: u32,
    generation: u32,
}

impl ResourceId {
    /// Slot index inside the pool
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packs the id as `generation << 32 | index`
    #[inline]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`to_raw`](Self::to_raw)
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

enum SlotState<T> {
    // Values are never dropped by the pool itself
    Occupied(ManuallyDrop<T>),
    Free { next: Option<u32> },
}

struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

impl<T> Slot<T> {
    fn is_live(&self, generation: u32) -> bool {
        self.generation == generation && matches!(self.state, SlotState::Occupied(_))
    }
}

/// Slot table mapping [`ResourceId`]s to values of `T`
///
/// Freed slots are linked into an intrusive free list and reused in LIFO
/// order. The slot array itself is allocated through `A`.
///
/// The pool only manages indirection memory. Values still live when the pool
/// is destroyed are leaked, never dropped: releasing a resource is the job of
/// whoever calls [`free`](Self::free).
///
/// # Examples
/// ```
/// use substrate_memory::pool::ResourcePool;
///
/// let mut pool = ResourcePool::new();
/// let id = pool.alloc_init("A")?;
/// assert_eq!(pool.get(id), Some(&"A"));
///
/// assert_eq!(pool.free(id), "A");
/// assert!(!pool.has(id));
/// # Ok::<(), substrate_memory::MemoryError>(())
/// ```
pub struct ResourcePool<T, A: Allocator = GeneralAllocator> {
    slots: AllocVec<Slot<T>, A>,
    free_head: Option<u32>,
    len: usize,
    config: PoolConfig,
}

impl<T> ResourcePool<T> {
    /// Creates an empty pool on the process heap
    pub fn new() -> Self {
        Self::new_in(GeneralAllocator::new())
    }

    /// Creates a pool on the process heap with custom configuration
    pub fn with_config(config: PoolConfig) -> AllocResult<Self> {
        Self::with_config_in(config, GeneralAllocator::new())
    }
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> ResourcePool<T, A> {
    /// Creates an empty pool whose slot array lives in `alloc`
    pub fn new_in(alloc: A) -> Self {
        Self {
            slots: AllocVec::new_in(alloc),
            free_head: None,
            len: 0,
            config: PoolConfig::default(),
        }
    }

    /// Creates a pool with custom configuration, reserving its initial slots
    pub fn with_config_in(config: PoolConfig, alloc: A) -> AllocResult<Self> {
        config.validate()?;
        let slots = AllocVec::with_capacity_in(config.initial_capacity, alloc)?;

        #[cfg(feature = "logging")]
        debug!(
            initial_capacity = config.initial_capacity,
            max_slots = ?config.max_slots,
            "resource pool created"
        );

        Ok(Self {
            slots,
            free_head: None,
            len: 0,
            config,
        })
    }

    /// Stores `value` and returns a fresh id for it
    ///
    /// Reuses the most recently freed slot in O(1); otherwise appends a new
    /// slot. Fails when the slot array cannot grow or a bounded pool is full,
    /// in which case the pool is unchanged and `value` is dropped. Both
    /// failures panic instead when the backing allocator is fail-fast.
    pub fn alloc_init(&mut self, value: T) -> AllocResult<ResourceId> {
        let id = match self.free_head {
            Some(index) => self.reuse_slot(index, value),
            None => self.push_slot(value)?,
        };
        self.len += 1;

        #[cfg(feature = "logging")]
        trace!(%id, live = self.len, "resource slot allocated");

        Ok(id)
    }

    fn reuse_slot(&mut self, index: u32, value: T) -> ResourceId {
        let slot = &mut self.slots[index as usize];
        let next = match slot.state {
            SlotState::Free { next } => next,
            SlotState::Occupied(_) => usage_violation(
                COMPONENT,
                &format!("free list head {index} points at an occupied slot"),
            ),
        };
        slot.state = SlotState::Occupied(ManuallyDrop::new(value));
        self.free_head = next;
        ResourceId {
            index,
            generation: slot.generation,
        }
    }

    fn push_slot(&mut self, value: T) -> AllocResult<ResourceId> {
        let limit = self.config.max_slots.unwrap_or(u32::MAX);
        let index = u32::try_from(self.slots.len())
            .ok()
            .filter(|&index| index < limit)
            .ok_or_else(|| {
                // A full pool fails the same way its allocator does
                capacity_failure(
                    MemoryError::pool_exhausted(COMPONENT, limit as usize),
                    self.slots.allocator().is_fail_fast(),
                )
            })?;

        // Reserve before wrapping `value` so a failure drops it normally
        #[cfg(feature = "logging")]
        let grows = self.slots.len() == self.slots.capacity();
        self.slots.try_reserve(1)?;

        #[cfg(feature = "logging")]
        {
            if grows {
                debug!(slots = self.slots.capacity(), "resource pool grown");
            }
        }

        self.slots.try_push(Slot {
            generation: 0,
            state: SlotState::Occupied(ManuallyDrop::new(value)),
        })?;
        Ok(ResourceId {
            index,
            generation: 0,
        })
    }

    /// Returns the value behind `id`, or `None` if the id is not live
    ///
    /// Out-of-range, freed and stale ids all resolve to `None`.
    pub fn get(&self, id: ResourceId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        match &slot.state {
            SlotState::Occupied(value) if slot.generation == id.generation => Some(&**value),
            _ => None,
        }
    }

    /// Mutable variant of [`get`](Self::get)
    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        match &mut slot.state {
            SlotState::Occupied(value) if slot.generation == id.generation => Some(&mut **value),
            _ => None,
        }
    }

    /// Whether `id` currently refers to a stored value
    pub fn has(&self, id: ResourceId) -> bool {
        self.get(id).is_some()
    }

    /// Removes the value behind `id` and hands it back
    ///
    /// The slot's generation is bumped, so `id` and all its copies stop
    /// resolving immediately.
    ///
    /// # Panics
    /// Freeing an id that is already free, stale or was never allocated is a
    /// usage violation. The pool is left unchanged.
    #[track_caller]
    pub fn free(&mut self, id: ResourceId) -> T {
        match self.try_free(id) {
            Some(value) => value,
            None => usage_violation(
                COMPONENT,
                &format!(
                    "free of id {id} which is not live \
                     (already freed, stale or never allocated)"
                ),
            ),
        }
    }

    /// Like [`free`](Self::free), but returns `None` for an id that is not live
    pub fn try_free(&mut self, id: ResourceId) -> Option<T> {
        let free_head = self.free_head;
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.is_live(id.generation))?;

        let SlotState::Occupied(value) =
            mem::replace(&mut slot.state, SlotState::Free { next: free_head })
        else {
            return None;
        };
        // Wraps after 2^32 reuses of the same slot
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = Some(id.index);
        self.len -= 1;

        #[cfg(feature = "logging")]
        trace!(%id, live = self.len, "resource slot freed");

        Some(ManuallyDrop::into_inner(value))
    }

    /// Number of live values
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever created, live or free
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots waiting on the free list
    #[inline]
    pub fn free_count(&self) -> usize {
        self.slots.len() - self.len
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Iterates over live values with their ids, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.state {
                SlotState::Occupied(value) => Some((
                    ResourceId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &**value,
                )),
                SlotState::Free { .. } => None,
            })
    }

    /// Releases the slot array and returns how many values were still live
    ///
    /// Live values are leaked: no destructor runs for them. Dropping the pool
    /// has the same effect.
    pub fn destroy(self) -> usize {
        let leaked = self.len;
        drop(self);
        leaked
    }
}

impl<T, A: Allocator> Drop for ResourcePool<T, A> {
    fn drop(&mut self) {
        #[cfg(feature = "logging")]
        {
            if self.len > 0 && self.config.warn_on_leak {
                warn!(
                    leaked = self.len,
                    slots = self.slots.len(),
                    "resource pool destroyed with live resources; they are not released"
                );
            }
            debug!(slots = self.slots.len(), "resource pool destroyed");
        }
    }
}

impl<T, A: Allocator> fmt::Debug for ResourcePool<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .field("free_head", &self.free_head)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use super::*;
    use crate::allocator::{StackAllocator, StackConfig};

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let mut pool = ResourcePool::new();
        let a = pool.alloc_init(1).unwrap();
        let b = pool.alloc_init(2).unwrap();
        assert_eq!(pool.free(a), 1);

        let c = pool.alloc_init(3).unwrap();
        assert_eq!(c.index(), a.index());
        assert_eq!(c.generation(), a.generation() + 1);
        assert_eq!(pool.get(a), None);
        assert_eq!(pool.get(c), Some(&3));
        assert_eq!(pool.get(b), Some(&2));
        assert_eq!(pool.slot_count(), 2);
    }

    #[test]
    fn free_list_is_lifo() {
        let mut pool = ResourcePool::new();
        let ids: Vec<_> = (0..4).map(|i| pool.alloc_init(i).unwrap()).collect();
        pool.free(ids[1]);
        pool.free(ids[3]);
        assert_eq!(pool.free_count(), 2);

        assert_eq!(pool.alloc_init(10).unwrap().index(), 3);
        assert_eq!(pool.alloc_init(11).unwrap().index(), 1);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.alloc_init(12).unwrap().index(), 4);
    }

    #[test]
    fn out_of_range_id_resolves_to_none() {
        let pool = ResourcePool::<u8>::new();
        let bogus = ResourceId::from_raw(7);
        assert!(pool.get(bogus).is_none());
        assert!(!pool.has(bogus));
    }

    #[test]
    fn raw_roundtrip_keeps_generation() {
        let mut pool = ResourcePool::new();
        let first = pool.alloc_init('x').unwrap();
        pool.free(first);
        let id = pool.alloc_init('y').unwrap();
        assert_eq!(ResourceId::from_raw(id.to_raw()), id);
        assert_eq!(id.to_raw(), 1 << 32);
        assert_eq!(id.to_string(), "0v1");
    }

    #[test]
    #[should_panic(expected = "ResourcePool: usage violation")]
    fn double_free_is_a_violation() {
        let mut pool = ResourcePool::new();
        let id = pool.alloc_init(5).unwrap();
        pool.free(id);
        pool.free(id);
    }

    #[test]
    fn stale_free_leaves_pool_unchanged() {
        let mut pool = ResourcePool::new();
        let old = pool.alloc_init("old").unwrap();
        pool.free(old);
        let new = pool.alloc_init("new").unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            pool.free(old);
        }));
        assert!(result.is_err());
        assert_eq!(pool.get(new), Some(&"new"));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.try_free(old), None);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut pool = ResourcePool::new();
        let id = pool.alloc_init(String::from("a")).unwrap();
        pool.get_mut(id).unwrap().push('b');
        assert_eq!(pool.get(id).map(String::as_str), Some("ab"));
    }

    #[test]
    fn destroy_leaks_live_values() {
        let marker = Rc::new(());
        let mut pool = ResourcePool::new();
        let freed = pool.alloc_init(Rc::clone(&marker)).unwrap();
        pool.alloc_init(Rc::clone(&marker)).unwrap();
        pool.alloc_init(Rc::clone(&marker)).unwrap();

        drop(pool.free(freed));
        assert_eq!(Rc::strong_count(&marker), 3);
        assert_eq!(pool.destroy(), 2);
        assert_eq!(Rc::strong_count(&marker), 3);
    }

    #[test]
    fn bounded_pool_reports_exhaustion() {
        let marker = Rc::new(());
        let mut pool = ResourcePool::with_config(PoolConfig::bounded(2)).unwrap();
        let a = pool.alloc_init(Rc::clone(&marker)).unwrap();
        pool.alloc_init(Rc::clone(&marker)).unwrap();

        let err = pool.alloc_init(Rc::clone(&marker)).unwrap_err();
        assert_eq!(err.code(), "MEM:POOL:EXHAUSTED");
        assert_eq!(Rc::strong_count(&marker), 3);

        drop(pool.free(a));
        assert!(pool.alloc_init(Rc::clone(&marker)).is_ok());
    }

    #[test]
    fn full_pool_panics_over_fail_fast_allocator() {
        let config = PoolConfig::bounded(1);
        let mut pool =
            ResourcePool::with_config_in(config, GeneralAllocator::fail_fast()).unwrap();
        let id = pool.alloc_init(1u32).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| pool.alloc_init(2)));
        let message = *result.unwrap_err().downcast::<String>().unwrap();
        assert!(message.starts_with("fail-fast"));

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.free(id), 1);
    }

    #[test]
    fn iter_visits_live_slots_only() {
        let mut pool = ResourcePool::new();
        let a = pool.alloc_init("a").unwrap();
        let b = pool.alloc_init("b").unwrap();
        let c = pool.alloc_init("c").unwrap();
        pool.free(b);

        let live: Vec<_> = pool.iter().collect();
        assert_eq!(live, vec![(a, &"a"), (c, &"c")]);
    }

    #[test]
    fn slot_array_lives_in_given_allocator() {
        let stack = StackAllocator::<1024, 8>::with_config(StackConfig::production()).unwrap();
        let mut pool = ResourcePool::<u64, _>::new_in(&stack);
        for i in 0..20 {
            pool.alloc_init(i).unwrap();
        }
        assert!(stack.used() > 0);
        assert_eq!(pool.destroy(), 20);
        assert_eq!(stack.used(), 0);
    }
}
