//! Resource pool configuration

use crate::error::{AllocResult, MemoryError};

/// Configuration for [`ResourcePool`](super::ResourcePool)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Slots reserved up front
    pub initial_capacity: usize,

    /// Maximum number of slots (None for unbounded)
    pub max_slots: Option<u32>,

    /// Log a warning when the pool is torn down with live resources
    pub warn_on_leak: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_slots: None,
            warn_on_leak: true,
        }
    }
}

impl PoolConfig {
    /// Unbounded pool with `capacity` slots reserved up front
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
            ..Self::default()
        }
    }

    /// Fixed-size pool: all slots reserved up front, never grows past them
    pub fn bounded(max_slots: u32) -> Self {
        Self {
            initial_capacity: max_slots as usize,
            max_slots: Some(max_slots),
            ..Self::default()
        }
    }

    /// Checks the configuration for consistency
    pub(crate) fn validate(&self) -> AllocResult<()> {
        match self.max_slots {
            Some(0) => Err(MemoryError::invalid_config(
                "max_slots must be greater than zero",
            )),
            Some(max) if self.initial_capacity > max as usize => {
                Err(MemoryError::invalid_config(&format!(
                    "initial_capacity {} exceeds max_slots {max}",
                    self.initial_capacity
                )))
            }
            _ => Ok(()),
        }
    }
}
