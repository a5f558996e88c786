//! # substrate-memory
//!
//! Low-level memory-management substrate: a uniform allocator contract, a
//! fixed-capacity LIFO stack allocator and a generational resource-handle
//! pool.
//!
//! - [`allocator::Allocator`] is the capability every allocator provides:
//!   `alloc`, `alloc_zeroed`, `realloc`, `dealloc`
//! - [`allocator::GeneralAllocator`] delegates to the process heap
//! - [`allocator::StackAllocator`] bumps through an owned buffer and only
//!   releases the most recent block
//! - [`pool::ResourcePool`] maps small generational ids to values so that
//!   handle-bearing values can be copied without duplicating ownership
//!
//! ## Quick Start
//!
//! ```rust
//! use substrate_memory::prelude::*;
//!
//! // Frame-style scratch memory
//! let stack = StackAllocator::<1024, 8>::new()?;
//! let a = stack.alloc(64)?;
//! let b = stack.alloc(128)?;
//! unsafe {
//!     stack.dealloc(Some(b));
//!     stack.dealloc(Some(a));
//! }
//!
//! // Handles that survive copying
//! let mut pool = ResourcePool::new();
//! let id = pool.alloc_init("socket")?;
//! let copy = id;
//! pool.free(id);
//! assert!(pool.get(copy).is_none());
//! # Ok::<(), substrate_memory::MemoryError>(())
//! ```
//!
//! ## Error classes
//!
//! - capacity failures return `Err(MemoryError)` (or panic in fail-fast mode)
//! - usage violations (out-of-order stack release, double free of an id)
//!   panic with context and leave state untouched
//! - dead handles resolve to `None` / [`stream::StreamError::Closed`]
//!
//! ## Features
//!
//! - `logging` (default): structured `tracing` events for allocator and pool
//!   activity

#![cfg_attr(docsrs, feature(doc_cfg))]
// Raw memory management throughout; each unsafe block has a SAFETY note
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
// Pointer casts go through allocators that guarantee the alignment
#![allow(clippy::cast_ptr_alignment)]

// Error types
pub mod error;
pub mod utils;

// Allocators
pub mod allocator;

// Consumers of the allocator contract
pub mod collections;
pub mod pool;
pub mod stream;

pub use error::{MemoryError, MemoryResult, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::allocator::{
        AllocResult, Allocator, GeneralAllocator, MemoryUsage, Resettable, StackAllocator,
        StackConfig, StatisticsProvider, TypedAllocator,
    };
    pub use crate::collections::AllocVec;
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::pool::{PoolConfig, ResourceId, ResourcePool, SharedPool};
    pub use crate::stream::{FileStream, StreamError, StreamPool};
}
