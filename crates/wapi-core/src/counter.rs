use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts wrap finalizers that have run (GC-driven or disposed).
///
/// Clones share the same count, so a harness can hand one to several contexts
/// and observe the total.
#[derive(Debug, Clone, Default)]
pub struct FinalizeCounter {
    count: Arc<AtomicU64>,
}

impl FinalizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Reset to zero, returning the previous value
    pub fn reset(&self) -> u64 {
        self.count.swap(0, Ordering::Relaxed)
    }
}
