//! Containers built on the allocator contract

pub mod vec;

pub use vec::AllocVec;
