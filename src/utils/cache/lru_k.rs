use super::Replacer;
use crate::buffer::FrameId;
use crate::error::{PlumeError, PlumeResult};
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
struct LruKNode {
    k: usize,
    // timestamps of the k most recent accesses
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    fn new(k: usize) -> Self {
        Self {
            k,
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: u64) {
        self.history.push_back(timestamp);
        if self.history.len() > self.k {
            self.history.pop_front();
        }
    }
}

/// LRU-K replacement policy. Frames with fewer than k recorded accesses
/// have infinite backward k-distance and are evicted first, oldest first.
#[derive(Debug)]
pub struct LruKReplacer {
    current_size: usize,
    replacer_size: usize,
    k: usize,
    node_store: HashMap<FrameId, LruKNode>,
    current_timestamp: u64,
}

impl LruKReplacer {
    pub fn with_k(num_frames: usize, k: usize) -> Self {
        Self {
            current_size: 0,
            replacer_size: num_frames,
            k,
            node_store: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
        }
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&mut self, frame_id: FrameId) -> PlumeResult<()> {
        if let Some(node) = self.node_store.get_mut(&frame_id) {
            node.record_access(self.current_timestamp);
        } else {
            if self.node_store.len() >= self.replacer_size {
                return Err(PlumeError::Internal(
                    "frame count exceeds replacer capacity".to_string(),
                ));
            }
            let mut node = LruKNode::new(self.k);
            node.record_access(self.current_timestamp);
            self.node_store.insert(frame_id, node);
        }
        self.current_timestamp += 1;
        Ok(())
    }

    // Evict the evictable frame with the largest backward k-distance.
    fn evict(&mut self) -> Option<FrameId> {
        let mut max_k_distance = 0;
        let mut victim = None;
        for (frame_id, node) in self.node_store.iter() {
            if !node.is_evictable {
                continue;
            }
            let Some(&oldest) = node.history.front() else {
                continue;
            };
            let k_distance = if node.history.len() < self.k {
                u64::MAX - oldest
            } else {
                self.current_timestamp - oldest
            };
            if k_distance > max_k_distance {
                max_k_distance = k_distance;
                victim = Some(*frame_id);
            }
        }
        if let Some(frame_id) = victim {
            self.remove(frame_id);
        }
        victim
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> PlumeResult<()> {
        let node = self
            .node_store
            .get_mut(&frame_id)
            .ok_or_else(|| PlumeError::Internal(format!("frame {} not found", frame_id)))?;
        if evictable && !node.is_evictable {
            self.current_size += 1;
        } else if !evictable && node.is_evictable {
            self.current_size -= 1;
        }
        node.is_evictable = evictable;
        Ok(())
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(node) = self.node_store.get(&frame_id) {
            assert!(node.is_evictable, "frame is not evictable");
            self.node_store.remove(&frame_id);
            self.current_size -= 1;
        }
    }

    fn size(&self) -> usize {
        self.current_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_evictable_tracks_size() {
        let mut replacer = LruKReplacer::with_k(3, 2);
        replacer.record_access(1).unwrap();
        replacer.set_evictable(1, true).unwrap();
        assert_eq!(replacer.size(), 1);
        replacer.set_evictable(1, false).unwrap();
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn evict_prefers_largest_k_distance() {
        let mut replacer = LruKReplacer::with_k(2, 3);
        replacer.record_access(1).unwrap(); // ts=0
        replacer.record_access(2).unwrap(); // ts=1
        replacer.record_access(2).unwrap(); // ts=2
        replacer.record_access(1).unwrap(); // ts=3
        replacer.record_access(2).unwrap(); // ts=4
        replacer.set_evictable(1, true).unwrap();
        replacer.set_evictable(2, true).unwrap();
        // frame 1 history [0, 3], frame 2 history [1, 2, 4]
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn evict_infinite_distance_oldest_first() {
        let mut replacer = LruKReplacer::with_k(4, 2);
        replacer.record_access(1).unwrap(); // ts=0
        replacer.record_access(2).unwrap(); // ts=1
        replacer.record_access(3).unwrap(); // ts=2
        replacer.record_access(1).unwrap(); // ts=3, frame 1 now has k accesses
        replacer.set_evictable(1, true).unwrap();
        replacer.set_evictable(2, true).unwrap();
        replacer.set_evictable(3, true).unwrap();
        // frames 2 and 3 have infinite k-distance; 2 is older
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn pinned_frames_are_not_evicted() {
        let mut replacer = LruKReplacer::with_k(2, 2);
        replacer.record_access(1).unwrap();
        replacer.record_access(2).unwrap();
        replacer.set_evictable(2, true).unwrap();
        assert_eq!(replacer.evict(), Some(2));
        // frame 1 was never made evictable
        assert_eq!(replacer.evict(), None);
    }
}
