//! Lockable, clonable handle to a [`ResourcePool`]
//!
//! A process typically creates one pool per resource kind at startup and
//! hands clones of this handle to every value that stores ids. The pool is
//! destroyed when the last clone goes away, e.g. at the end of `main`.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::{PoolConfig, ResourceId, ResourcePool};
use crate::allocator::{AllocResult, Allocator, GeneralAllocator};

/// Shared [`ResourcePool`] behind a mutex
///
/// Every method locks for the duration of one pool operation only.
///
/// # Examples
/// ```
/// use substrate_memory::pool::SharedPool;
///
/// let pool = SharedPool::new();
/// let id = pool.alloc_init(String::from("config.toml"))?;
///
/// let copy = pool.clone();
/// assert_eq!(copy.with(id, |name| name.len()), Some(11));
///
/// pool.free(id);
/// assert!(!copy.has(id));
/// # Ok::<(), substrate_memory::MemoryError>(())
/// ```
pub struct SharedPool<T, A: Allocator = GeneralAllocator> {
    inner: Arc<Mutex<ResourcePool<T, A>>>,
}

impl<T> SharedPool<T> {
    /// Creates an empty shared pool on the process heap
    pub fn new() -> Self {
        Self::from_pool(ResourcePool::new())
    }

    /// Creates a shared pool on the process heap with custom configuration
    pub fn with_config(config: PoolConfig) -> AllocResult<Self> {
        ResourcePool::with_config(config).map(Self::from_pool)
    }
}

impl<T> Default for SharedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> SharedPool<T, A> {
    /// Wraps an existing pool
    pub fn from_pool(pool: ResourcePool<T, A>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    /// See [`ResourcePool::alloc_init`]
    pub fn alloc_init(&self, value: T) -> AllocResult<ResourceId> {
        self.inner.lock().alloc_init(value)
    }

    /// See [`ResourcePool::has`]
    pub fn has(&self, id: ResourceId) -> bool {
        self.inner.lock().has(id)
    }

    /// Runs `f` on the value behind `id` while holding the lock
    ///
    /// Returns `None` without calling `f` when the id is not live.
    pub fn with<R>(&self, id: ResourceId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.lock().get_mut(id).map(f)
    }

    /// See [`ResourcePool::free`]
    ///
    /// # Panics
    /// On an id that is not live, with the pool unchanged.
    #[track_caller]
    pub fn free(&self, id: ResourceId) -> T {
        self.inner.lock().free(id)
    }

    /// See [`ResourcePool::try_free`]
    pub fn try_free(&self, id: ResourceId) -> Option<T> {
        self.inner.lock().try_free(id)
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Locks the pool for a sequence of operations
    pub fn lock(&self) -> MutexGuard<'_, ResourcePool<T, A>> {
        self.inner.lock()
    }

    /// Number of handles sharing this pool
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Destroys the pool if this is the last handle, returning the number
    /// of leaked live values; otherwise gives the handle back
    pub fn destroy(self) -> Result<usize, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().destroy()),
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl<T, A: Allocator> Clone for SharedPool<T, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, A: Allocator> std::fmt::Debug for SharedPool<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPool")
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}
