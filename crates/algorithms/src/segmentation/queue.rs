//! Min-priority queue entry shared by the flooding kernels

use std::cmp::Ordering;

/// A voxel waiting in the flood queue.
///
/// Ordered so `BinaryHeap` (a max-heap) pops the lowest priority first and,
/// among equal priorities, the earliest pushed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueEntry {
    pub priority: f64,
    pub age: u64,
    pub index: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.age.cmp(&self.age))
    }
}
