//! Resource pool handle semantics through the public API.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use substrate_memory::prelude::*;

#[test]
fn scenario_free_then_reuse() {
    let mut pool = ResourcePool::new();
    let id0 = pool.alloc_init("A").unwrap();
    assert_eq!(pool.get(id0), Some(&"A"));

    pool.free(id0);
    assert!(!pool.has(id0));

    let id1 = pool.alloc_init("B").unwrap();
    assert_eq!(pool.get(id1), Some(&"B"));
    assert_eq!(pool.slot_count(), 1);
}

#[test]
fn old_id_stays_dead_after_slot_reuse() {
    let mut pool = ResourcePool::new();
    let old = pool.alloc_init(1u8).unwrap();
    pool.free(old);
    assert_eq!(pool.get(old), None);

    let new = pool.alloc_init(2u8).unwrap();
    assert_eq!(new.index(), old.index());
    assert_ne!(new, old);
    assert_eq!(pool.get(old), None);
    assert!(!pool.has(old));
    assert_eq!(pool.get(new), Some(&2));
}

#[test]
fn copied_ids_observe_the_same_slot() {
    let mut pool = ResourcePool::new();
    let id = pool.alloc_init(vec![1, 2, 3]).unwrap();
    let copy = id;

    pool.get_mut(id).unwrap().push(4);
    assert_eq!(pool.get(copy).map(Vec::len), Some(4));

    pool.free(copy);
    assert!(pool.get(id).is_none());
}

#[test]
fn ids_survive_integer_round_trip() {
    let mut pool = ResourcePool::new();
    let id = pool.alloc_init('z').unwrap();
    let raw: u64 = id.to_raw();
    assert_eq!(pool.get(ResourceId::from_raw(raw)), Some(&'z'));
}

#[test]
fn never_allocated_id_free_is_fatal_and_harmless() {
    let mut pool = ResourcePool::new();
    let live = pool.alloc_init(10).unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| {
        pool.free(ResourceId::from_raw(99));
    }));
    assert!(result.is_err());
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.get(live), Some(&10));
}

#[test]
#[should_panic(expected = "usage violation")]
fn free_of_stale_id_is_fatal() {
    let mut pool = ResourcePool::new();
    let old = pool.alloc_init(()).unwrap();
    pool.free(old);
    pool.alloc_init(()).unwrap();
    pool.free(old);
}

#[test]
fn dropping_pool_does_not_release_live_values() {
    let marker = Rc::new(());
    let mut pool = ResourcePool::with_config(PoolConfig::with_capacity(4)).unwrap();
    pool.alloc_init(Rc::clone(&marker)).unwrap();
    let released = pool.alloc_init(Rc::clone(&marker)).unwrap();

    drop(pool.free(released));
    drop(pool);
    assert_eq!(Rc::strong_count(&marker), 2);
}

#[test]
fn pool_slots_can_live_in_a_stack_allocator() {
    let stack = StackAllocator::<4096, 16>::with_config(StackConfig::production()).unwrap();
    let mut pool = ResourcePool::with_config_in(PoolConfig::with_capacity(8), &stack).unwrap();
    let ids: Vec<_> = (0..8u32).map(|i| pool.alloc_init(i).unwrap()).collect();
    let reserved = stack.used();

    for &id in &ids[..4] {
        pool.free(id);
    }
    for i in 0..4 {
        pool.alloc_init(100 + i).unwrap();
    }
    assert_eq!(stack.used(), reserved);
    assert_eq!(pool.len(), 8);

    assert_eq!(pool.destroy(), 8);
    assert!(stack.is_empty());
}

#[test]
fn shared_pool_handles_see_one_table() {
    let pool = SharedPool::new();
    let writer = pool.clone();
    let id = writer.alloc_init(String::new()).unwrap();

    writer.with(id, |s| s.push_str("shared"));
    assert_eq!(pool.with(id, |s| s.clone()).as_deref(), Some("shared"));

    assert_eq!(pool.free(id), "shared");
    assert_eq!(writer.with(id, |s| s.len()), None);
    assert!(writer.try_free(id).is_none());
}
