//! Allocators and the allocator capability contract
//!
//! Every allocator here implements [`Allocator`]. Containers and pools take
//! the allocator as an explicit type parameter; there is no process-wide
//! default.

// Core allocator types
mod general;
mod stats;
mod traits;

// Allocator implementations
pub mod stack;

// Re-exports for convenience
pub use crate::error::{AllocError, AllocResult};
pub use general::{GeneralAllocator, HEAP_ALIGNMENT};
pub use stack::{StackAllocator, StackConfig};
pub use stats::{AllocatorStats, StatisticsProvider};
pub use traits::{Allocator, MemoryUsage, Resettable, TypedAllocator};
