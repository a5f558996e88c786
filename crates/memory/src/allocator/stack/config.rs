//! Stack allocator configuration

/// Configuration for stack allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill patterns for debugging
    pub alloc_pattern: Option<u8>,
    pub dealloc_pattern: Option<u8>,

    /// Abort instead of returning an error when capacity runs out
    pub fail_fast: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            track_stats: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) { Some(0xCC) } else { None },
            dealloc_pattern: if cfg!(debug_assertions) { Some(0xDD) } else { None },
            fail_fast: false,
        }
    }
}

impl StackConfig {
    /// Production configuration - optimized for performance
    pub fn production() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            fail_fast: false,
        }
    }

    /// Debug configuration - optimized for debugging
    pub fn debug() -> Self {
        Self {
            track_stats: true,
            alloc_pattern: Some(0xCC),
            dealloc_pattern: Some(0xDD),
            fail_fast: false,
        }
    }

    /// Hot-path configuration: no checks at call sites, exhaustion aborts
    pub fn fail_fast() -> Self {
        Self {
            fail_fast: true,
            ..Self::production()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert!(!StackConfig::production().track_stats);
        assert_eq!(StackConfig::debug().dealloc_pattern, Some(0xDD));
        assert!(StackConfig::fail_fast().fail_fast);
        assert!(!StackConfig::default().fail_fast);
    }
}
