//! B+Tree protocol over slotted pages.
//!
//! The tree lives entirely in the table's page file and is reached through
//! the buffer pool. Leaf pages hold the key/value records and form a doubly
//! linked list in ascending key order; internal pages hold separator keys
//! and child pointers, with the leftmost child stored in the page header.
//!
//! Every operation works on caller-local page copies: a page is copied out
//! of its frame, modified, and copied back in dirty, so pins never outlive
//! a single page access. Parent links are the `parent_page_id` ids stored
//! in page headers, resolved through the pool on each use.
//!
//! Separator convention: an internal entry's key is the smallest key
//! reachable through its child, so keys greater than or equal to a
//! separator route to the right of it.

mod delete;
mod insert;
mod internal;
mod scan;
mod search;

pub use scan::RangeScan;

use crate::page::SlottedPage;
use crate::table::Table;
use bytes::Bytes;
use sedge_common::page::PageId;
use sedge_common::{Result, SedgeError};

/// Descent guard against malformed trees.
const MAX_TREE_DEPTH: usize = 100;

/// Outcome of splitting a leaf page.
pub(crate) struct LeafSplit {
    /// Page id of the new right sibling.
    pub new_page_id: PageId,
    /// First key of the right page, routed upward.
    pub separator: Bytes,
    /// Rewritten left half (the original page id).
    pub left: SlottedPage,
    /// New right half.
    pub right: SlottedPage,
}

/// Outcome of splitting an internal page.
pub(crate) struct InternalSplit {
    /// Page id of the new right sibling.
    pub new_page_id: PageId,
    /// Promoted separator key, routed upward.
    pub separator: Bytes,
}

impl Table {
    /// Replaces the value stored under `key`.
    ///
    /// When the new value has exactly the old value's length the bytes are
    /// overwritten in place, which cannot lose the record. Otherwise this
    /// is delete-then-insert: if the delete succeeds and the re-insert
    /// fails (page split failure, I/O error), the record is lost.
    pub fn update(&mut self, key: &[u8], new_value: &[u8]) -> Result<()> {
        if self.root_page == 0 {
            return Err(SedgeError::KeyNotFound);
        }

        let (leaf_id, mut leaf) = search::find_leaf_page(self, key)?;
        let Ok(index) = leaf.search(key) else {
            return Err(SedgeError::KeyNotFound);
        };

        if leaf.replace_value(index as u16, new_value) {
            return self.write_page(leaf_id, &leaf);
        }

        self.delete(key)?;
        self.insert(key, new_value)
    }
}
