//! Heap statistics

/// Counters kept by a heap when `track_stats` is enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Total allocations performed
    pub total_allocs: u64,
    /// Total successful frees
    pub total_frees: u64,
    /// Blocks added
    pub expansions: u64,
    /// Emptied blocks given back by the shrink policy
    pub shrinks: u64,
    /// Frees rejected by a guard
    pub guard_violations: u64,
    /// Highest number of simultaneously allocated elements
    pub peak_allocated: usize,
}

impl HeapStats {
    pub(crate) fn record_alloc(&mut self, allocated_now: usize) {
        self.total_allocs += 1;
        self.peak_allocated = self.peak_allocated.max(allocated_now);
    }

    pub(crate) fn record_free(&mut self) {
        self.total_frees += 1;
    }

    /// Elements allocated and not yet freed
    pub fn live(&self) -> u64 {
        self.total_allocs - self.total_frees
    }
}
