//! Allocator statistics tracking

use core::cell::Cell;

/// Statistics for memory allocators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Total bytes currently allocated
    pub allocated_bytes: usize,
    /// Peak bytes allocated
    pub peak_allocated_bytes: usize,
    /// Total number of allocations
    pub allocation_count: usize,
    /// Total number of deallocations
    pub deallocation_count: usize,
    /// Total number of reallocations
    pub reallocation_count: usize,
    /// Number of failed allocations
    pub failed_allocations: usize,
}

impl AllocatorStats {
    /// Calculate current allocation efficiency (0.0 to 1.0)
    /// Higher values indicate fewer failed allocations
    pub fn allocation_efficiency(&self) -> f64 {
        let total_attempts = self.allocation_count + self.failed_allocations;
        if total_attempts > 0 {
            self.allocation_count as f64 / total_attempts as f64
        } else {
            1.0
        }
    }

    /// Number of allocations not yet released
    pub fn live_allocations(&self) -> usize {
        self.allocation_count.saturating_sub(self.deallocation_count)
    }
}

/// Statistics provider trait
pub trait StatisticsProvider {
    /// Get current statistics
    fn statistics(&self) -> AllocatorStats;

    /// Reset statistics
    fn reset_statistics(&self);

    /// Check if statistics collection is enabled
    fn statistics_enabled(&self) -> bool {
        true
    }
}

/// Single-threaded counters behind an allocator's `&self` methods
#[derive(Debug, Default)]
pub(crate) struct LocalCounters {
    allocs: Cell<usize>,
    deallocs: Cell<usize>,
    reallocs: Cell<usize>,
    failures: Cell<usize>,
    peak: Cell<usize>,
}

impl LocalCounters {
    pub(crate) fn record_alloc(&self, used_after: usize) {
        self.allocs.set(self.allocs.get() + 1);
        self.record_usage(used_after);
    }

    pub(crate) fn record_dealloc(&self) {
        self.deallocs.set(self.deallocs.get() + 1);
    }

    pub(crate) fn record_realloc(&self, used_after: usize) {
        self.reallocs.set(self.reallocs.get() + 1);
        self.record_usage(used_after);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.set(self.failures.get() + 1);
    }

    fn record_usage(&self, used: usize) {
        if used > self.peak.get() {
            self.peak.set(used);
        }
    }

    pub(crate) fn snapshot(&self, allocated_bytes: usize) -> AllocatorStats {
        AllocatorStats {
            allocated_bytes,
            peak_allocated_bytes: self.peak.get().max(allocated_bytes),
            allocation_count: self.allocs.get(),
            deallocation_count: self.deallocs.get(),
            reallocation_count: self.reallocs.get(),
            failed_allocations: self.failures.get(),
        }
    }

    pub(crate) fn reset(&self) {
        self.allocs.set(0);
        self.deallocs.set(0);
        self.reallocs.set(0);
        self.failures.set(0);
        self.peak.set(0);
    }
}
