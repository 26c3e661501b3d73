//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use std::collections::VecDeque;

/// Trait for page replacement algorithms.
pub trait Replacer {
    /// Records that the given frame was accessed.
    fn record_access(&mut self, frame_id: FrameId);

    /// Marks a frame as evictable (unpinned) or removes it from the
    /// candidate set (pinned).
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction.
    ///
    /// `can_evict` is consulted per candidate; frames it rejects are skipped
    /// but remain candidates. Returns None if no frame qualifies.
    fn evict(&mut self, can_evict: &mut dyn FnMut(FrameId) -> bool) -> Option<FrameId>;

    /// Removes a frame from the replacer.
    fn remove(&mut self, frame_id: FrameId);

    /// Returns the number of eviction candidates.
    fn size(&self) -> usize;
}

/// Least-recently-used replacement.
///
/// Candidate frames live in a deque ordered by recency: the most recently
/// used frame sits at the front, the least recently used at the back.
/// Eviction scans from the back so the coldest frame goes first.
pub struct LruReplacer {
    /// Eviction candidates, most recently used first.
    list: VecDeque<FrameId>,
}

impl LruReplacer {
    /// Creates a new empty LRU replacer.
    pub fn new() -> Self {
        Self {
            list: VecDeque::new(),
        }
    }

    fn position(&self, frame_id: FrameId) -> Option<usize> {
        self.list.iter().position(|&f| f == frame_id)
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if let Some(pos) = self.position(frame_id) {
            self.list.remove(pos);
            self.list.push_front(frame_id);
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let pos = self.position(frame_id);
        match (evictable, pos) {
            (true, Some(p)) => {
                self.list.remove(p);
                self.list.push_front(frame_id);
            }
            (true, None) => self.list.push_front(frame_id),
            (false, Some(p)) => {
                self.list.remove(p);
            }
            (false, None) => {}
        }
    }

    fn evict(&mut self, can_evict: &mut dyn FnMut(FrameId) -> bool) -> Option<FrameId> {
        for i in (0..self.list.len()).rev() {
            let frame_id = self.list[i];
            if can_evict(frame_id) {
                self.list.remove(i);
                return Some(frame_id);
            }
        }
        None
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(pos) = self.position(frame_id) {
            self.list.remove(pos);
        }
    }

    fn size(&self) -> usize {
        self.list.len()
    }
}
