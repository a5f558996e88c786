//! A stack allocator for LIFO (Last In, First Out) memory management.
//!
//! ## Modules
//! - `allocator` - Main `StackAllocator` implementation with LIFO semantics
//! - `config` - Configuration variants (production, debug, fail-fast)
//! - `header` - Per-block headers and the owned backing buffer
pub mod allocator;
pub mod config;
pub mod header;
pub use allocator::{MIN_ALIGN, StackAllocator};
pub use config::StackConfig;
pub use header::{AllocationHeader, HEADER_SIZE};
