use std::collections::VecDeque;

use log::debug;

use crate::volume::{VolumeGrid, VoxelData};

pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded undo stack of voxel snapshots. Pushing onto a full stack evicts the oldest.
/// There is no redo.
#[derive(Debug, Clone)]
pub struct EditHistory {
    capacity: usize,
    snapshots: VecDeque<VoxelData>,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EditHistory {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            snapshots: VecDeque::with_capacity(capacity),
        }
    }

    /// Deep-copies the grid's current voxels onto the stack. Returns the oldest snapshot
    /// if it had to be evicted to make room.
    pub fn push(&mut self, grid: &VolumeGrid) -> Option<VoxelData> {
        self.push_data(grid.data().clone())
    }

    pub fn push_data(&mut self, data: VoxelData) -> Option<VoxelData> {
        let evicted = if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        };
        self.snapshots.push_back(data);
        debug!("history holds {}/{} snapshots", self.len(), self.capacity);
        evicted
    }

    /// Puts a snapshot evicted by [`EditHistory::push`] back at the bottom of the stack.
    /// Ignored when the stack is already full.
    pub fn restore_oldest(&mut self, data: VoxelData) {
        if self.snapshots.len() < self.capacity {
            self.snapshots.push_front(data);
        }
    }

    /// Removes and returns the most recent snapshot.
    pub fn pop(&mut self) -> Option<VoxelData> {
        self.snapshots.pop_back()
    }

    pub fn peek(&self) -> Option<&VoxelData> {
        self.snapshots.back()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn can_undo(&self) -> bool {
        !self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn snapshot(value: f32) -> VoxelData {
        VoxelData::Intensity(Array3::from_elem((1, 1, 2), value))
    }

    #[test]
    fn overflow_keeps_most_recent() {
        let mut history = EditHistory::new(4);
        for i in 0..7 {
            history.push_data(snapshot(i as f32));
        }
        assert_eq!(history.len(), 4);
        for expected in (3..7).rev() {
            assert_eq!(history.pop(), Some(snapshot(expected as f32)));
        }
        assert_eq!(history.pop(), None);
    }

    #[test]
    fn evicted_snapshot_can_be_put_back() {
        let mut history = EditHistory::new(2);
        assert_eq!(history.push_data(snapshot(0.0)), None);
        assert_eq!(history.push_data(snapshot(1.0)), None);
        let evicted = history.push_data(snapshot(2.0));
        assert_eq!(evicted, Some(snapshot(0.0)));

        history.pop();
        if let Some(oldest) = evicted {
            history.restore_oldest(oldest);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.pop(), Some(snapshot(1.0)));
        assert_eq!(history.pop(), Some(snapshot(0.0)));
    }

    #[test]
    fn default_capacity_is_ten() {
        let mut history = EditHistory::default();
        for i in 0..13 {
            history.push_data(snapshot(i as f32));
        }
        assert_eq!(history.len(), DEFAULT_CAPACITY);
        assert_eq!(history.peek(), Some(&snapshot(12.0)));
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut history = EditHistory::new(0);
        history.push_data(snapshot(1.0));
        history.push_data(snapshot(2.0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.pop(), Some(snapshot(2.0)));
    }
}
