//! Page ID to frame ID mapping.

use crate::frame::FrameId;
use sedge_common::page::PageId;
use std::collections::HashMap;

/// Maps resident page ids to the frames that hold them.
///
/// A page is resident in at most one frame, so the mapping is one-to-one.
pub struct PageTable {
    map: HashMap<PageId, FrameId>,
}

impl PageTable {
    /// Creates a new page table with room for `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }

    /// Looks up the frame holding a page.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.map.get(&page_id).copied()
    }

    /// Returns true if the page is resident.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.map.contains_key(&page_id)
    }

    /// Inserts a page → frame mapping.
    #[inline]
    pub fn insert(&mut self, page_id: PageId, frame_id: FrameId) {
        self.map.insert(page_id, frame_id);
    }

    /// Removes a mapping, returning the frame that held the page.
    #[inline]
    pub fn remove(&mut self, page_id: PageId) -> Option<FrameId> {
        self.map.remove(&page_id)
    }

    /// Returns the number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no pages are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over (page_id, frame_id) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PageId, FrameId)> + '_ {
        self.map.iter().map(|(&p, &f)| (p, f))
    }
}
