//! Leaf insertion and leaf splits.

use super::internal::insert_into_parent;
use super::search::find_leaf_page;
use super::LeafSplit;
use crate::page::SlottedPage;
use crate::record::compare_keys;
use crate::table::{Table, META_PAGE_ID};
use bytes::Bytes;
use sedge_common::page::{PageLevel, PageType};
use sedge_common::{Result, SedgeError};
use std::cmp::Ordering;

impl Table {
    /// Inserts a key/value record, splitting the target leaf if needed.
    ///
    /// Fails with `DuplicateKey` if the key is already present; keys are
    /// unique across the tree.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.root_page == 0 {
            return self.insert_into_empty_tree(key, value);
        }

        let (leaf_id, leaf) = find_leaf_page(self, key)?;
        if leaf.search(key).is_ok() {
            return Err(SedgeError::DuplicateKey);
        }

        // Common case: the record fits the leaf as is.
        let mut leaf = leaf;
        match leaf.insert(key, value) {
            Ok(()) => return self.write_page(leaf_id, &leaf),
            Err(SedgeError::PageFull) => {}
            Err(e) => return Err(e),
        }

        let split = split_leaf_page(self, leaf)?;

        // The split halves are each at most half full, so the pending
        // record is guaranteed to fit whichever side the comparator picks.
        if compare_keys(key, &split.separator) == Ordering::Less {
            let mut left = split.left;
            left.insert(key, value)?;
            self.write_page(leaf_id, &left)?;
        } else {
            let mut right = split.right;
            right.insert(key, value)?;
            self.write_page(split.new_page_id, &right)?;
        }

        insert_into_parent(self, leaf_id, &split.separator, split.new_page_id, 0)
    }

    /// First insert into an empty tree: allocate a leaf, point the meta
    /// page's root at it, and place the record.
    fn insert_into_empty_tree(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let root_page_id = self.allocate_page()?;
        let mut root = SlottedPage::new(root_page_id, PageType::Data, PageLevel::Leaf);
        root.insert(key, value)?;

        self.write_page(root_page_id, &root)?;
        self.root_page = root_page_id;
        self.update_header(META_PAGE_ID, |h| h.root_page = root_page_id)
    }
}

/// Splits a full leaf into two.
///
/// All live records are gathered, the left page is rewritten in place with
/// the first `max(1, total / 2)` of them (compacting away deleted records),
/// and the rest move to a newly allocated right page. The separator is the
/// right page's first key. Sibling links are stitched so the leaf chain
/// stays intact, including the left page's preserved `prev` pointer.
pub(crate) fn split_leaf_page(table: &mut Table, page: SlottedPage) -> Result<LeafSplit> {
    let header = page.header();
    let total = header.cell_count;
    if total == 0 {
        return Err(SedgeError::Internal("cannot split empty page".to_string()));
    }

    let split_idx = (total / 2).max(1);
    let left_page_id = header.page_id;
    let saved_parent_id = header.parent_page_id;
    let saved_prev_page_id = header.prev_page_id;
    let old_next_page_id = header.next_page_id;

    let mut records: Vec<(Bytes, Bytes)> = Vec::with_capacity(total as usize);
    for i in 0..total {
        let (Some(key), Some(value)) = (page.slot_key(i), page.slot_value(i)) else {
            return Err(SedgeError::PageCorrupted {
                page_id: left_page_id,
                reason: format!("unreadable record {}", i),
            });
        };
        records.push((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
    }

    let new_page_id = table.allocate_page()?;

    let mut left = SlottedPage::new(left_page_id, PageType::Data, PageLevel::Leaf);
    let mut right = SlottedPage::new(new_page_id, PageType::Data, PageLevel::Leaf);

    for (key, value) in &records[..split_idx as usize] {
        left.insert(key, value)?;
    }
    for (key, value) in &records[split_idx as usize..] {
        right.insert(key, value)?;
    }

    if left.cell_count() == 0 || right.cell_count() == 0 {
        return Err(SedgeError::Internal("page is empty after split".to_string()));
    }

    let separator = {
        let Some(key) = right.slot_key(0) else {
            return Err(SedgeError::PageCorrupted {
                page_id: new_page_id,
                reason: "no separator key after split".to_string(),
            });
        };
        Bytes::copy_from_slice(key)
    };

    let mut left_header = left.header();
    left_header.parent_page_id = saved_parent_id;
    left_header.prev_page_id = saved_prev_page_id;
    left_header.next_page_id = new_page_id;
    left.set_header(&left_header);

    let mut right_header = right.header();
    right_header.parent_page_id = saved_parent_id;
    right_header.prev_page_id = left_page_id;
    right_header.next_page_id = old_next_page_id;
    right.set_header(&right_header);

    if old_next_page_id != 0 {
        table.update_header(old_next_page_id, |h| h.prev_page_id = new_page_id)?;
    }

    table.write_page(left_page_id, &left)?;
    table.write_page(new_page_id, &right)?;

    Ok(LeafSplit {
        new_page_id,
        separator,
        left,
        right,
    })
}
