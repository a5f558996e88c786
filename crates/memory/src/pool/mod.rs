//! Generational resource-handle pool
//!
//! Maps small [`ResourceId`]s to values stored in a reusable slot table, so a
//! handle-bearing value can be copied freely while every copy observes the
//! same underlying resource.
//!
//! ## Modules
//! - `resource` - `ResourcePool` slot table and `ResourceId`
//! - `shared` - `SharedPool`, a lockable handle for process-scoped pools
//! - `config` - `PoolConfig`

mod config;
mod resource;
mod shared;

pub use config::PoolConfig;
pub use resource::{ResourceId, ResourcePool};
pub use shared::SharedPool;
