//! Leaf deletion, underflow repair, and sibling merges.

use super::search::find_leaf_page;
use crate::page::SlottedPage;
use crate::record::compare_keys;
use crate::table::{Table, META_PAGE_ID};
use bytes::Bytes;
use sedge_common::page::{PageHeader, PageId, PageLevel, PageType, PAGE_SIZE};
use sedge_common::{Result, SedgeError};

/// What the parent knows about a leaf's neighbourhood.
///
/// `separator_key` is the parent entry pointing at the leaf itself (used to
/// detach the leaf when it merges leftward); `right_separator_key` is the
/// entry pointing at the right sibling (used when the leaf absorbs it).
/// For the leftmost child no current separator exists; the parent's header
/// pointer identifies it instead.
#[derive(Debug, Default)]
struct SiblingInfo {
    left_sibling: PageId,
    right_sibling: PageId,
    separator_key: Bytes,
    right_separator_key: Bytes,
    is_leftmost: bool,
}

impl Table {
    /// Deletes `key` from the tree.
    ///
    /// After the record is removed the leaf is checked for underflow and
    /// repaired by merging with a sibling where the union fits one page:
    /// left sibling first, then right. A leaf left empty when no merge is
    /// possible is detached and freed. Internal nodes are not rebalanced.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        if self.root_page == 0 {
            return Err(SedgeError::KeyNotFound);
        }

        let (leaf_id, mut leaf) = find_leaf_page(self, key)?;
        if !leaf.delete(key) {
            return Err(SedgeError::KeyNotFound);
        }
        self.write_page(leaf_id, &leaf)?;

        let header = leaf.header();

        // Root leaf: an emptied root resets the tree.
        if header.parent_page_id == 0 {
            if header.cell_count == 0 {
                self.root_page = 0;
                self.update_header(META_PAGE_ID, |h| h.root_page = 0)?;
                self.unlink_leaf(&header)?;
                self.free_page(leaf_id)?;
            }
            return Ok(());
        }

        let parent_id = header.parent_page_id;

        if leaf.is_underutilized() {
            let siblings = find_leaf_siblings(self, leaf_id, &leaf)?;

            if siblings.left_sibling != 0 {
                let left = self.read_page(siblings.left_sibling)?;
                if can_merge_pages(&left, &leaf) {
                    merge_leaf_pages(self, siblings.left_sibling, &left, leaf_id, &leaf)?;
                    remove_from_internal(self, parent_id, &siblings.separator_key, leaf_id)?;
                    return Ok(());
                }
            }
            if siblings.right_sibling != 0 {
                let right = self.read_page(siblings.right_sibling)?;
                if can_merge_pages(&leaf, &right) {
                    merge_leaf_pages(self, leaf_id, &leaf, siblings.right_sibling, &right)?;
                    remove_from_internal(
                        self,
                        parent_id,
                        &siblings.right_separator_key,
                        siblings.right_sibling,
                    )?;
                    leaf = self.read_page(leaf_id)?;
                }
            }
        }

        // A still-empty leaf was refused a size-checked merge; force one
        // (safe, one side is empty) or detach the leaf outright.
        if leaf.cell_count() == 0 {
            let siblings = find_leaf_siblings(self, leaf_id, &leaf)?;
            let header = leaf.header();

            if siblings.is_leftmost {
                if siblings.right_sibling != 0 {
                    let right = self.read_page(siblings.right_sibling)?;
                    merge_leaf_pages(self, leaf_id, &leaf, siblings.right_sibling, &right)?;
                    remove_from_internal(
                        self,
                        parent_id,
                        &siblings.right_separator_key,
                        siblings.right_sibling,
                    )?;
                } else {
                    self.update_header(parent_id, |h| h.leftmost_child = 0)?;
                    self.unlink_leaf(&header)?;
                    self.free_page(leaf_id)?;
                    self.collapse_if_childless(parent_id)?;
                }
            } else if siblings.left_sibling != 0 {
                let left = self.read_page(siblings.left_sibling)?;
                merge_leaf_pages(self, siblings.left_sibling, &left, leaf_id, &leaf)?;
                remove_from_internal(self, parent_id, &siblings.separator_key, leaf_id)?;
            } else if siblings.right_sibling != 0 {
                let right = self.read_page(siblings.right_sibling)?;
                merge_leaf_pages(self, leaf_id, &leaf, siblings.right_sibling, &right)?;
                remove_from_internal(
                    self,
                    parent_id,
                    &siblings.right_separator_key,
                    siblings.right_sibling,
                )?;
            } else {
                self.unlink_leaf(&header)?;
                self.free_page(leaf_id)?;
            }
        }

        Ok(())
    }

    /// Frees an internal page that has lost its last child, detaching it
    /// from its own parent and cascading toward the root.
    ///
    /// Keys never route through a childless node again, and a fully
    /// emptied tree resets its root to 0. An internal root that still has
    /// one child is left in place; sole children are not promoted.
    fn collapse_if_childless(&mut self, page_id: PageId) -> Result<()> {
        let header = self.read_header(page_id)?;
        if header.cell_count != 0 || header.leftmost_child != 0 {
            return Ok(());
        }

        if header.parent_page_id == 0 {
            self.root_page = 0;
            self.update_header(META_PAGE_ID, |h| h.root_page = 0)?;
            self.free_page(page_id)?;
            return Ok(());
        }

        let parent_id = header.parent_page_id;
        remove_child_from_internal(self, parent_id, page_id)?;
        self.free_page(page_id)?;
        self.collapse_if_childless(parent_id)
    }

    /// Patches the neighbours of a leaf that is about to be freed:
    /// `prev.next <- my.next` and `next.prev <- my.prev`.
    fn unlink_leaf(&mut self, header: &PageHeader) -> Result<()> {
        if header.prev_page_id != 0 {
            let next = header.next_page_id;
            self.update_header(header.prev_page_id, |h| h.next_page_id = next)?;
        }
        if header.next_page_id != 0 {
            let prev = header.prev_page_id;
            self.update_header(header.next_page_id, |h| h.prev_page_id = prev)?;
        }
        Ok(())
    }
}

/// Walks the parent's entries to find the leaf's neighbours and the
/// separator keys that point at the leaf and its right sibling.
fn find_leaf_siblings(table: &mut Table, leaf_id: PageId, leaf: &SlottedPage) -> Result<SiblingInfo> {
    let mut info = SiblingInfo::default();

    let header = leaf.header();
    if header.parent_page_id == 0 {
        info.is_leftmost = true;
        return Ok(info);
    }

    let parent = table.read_page(header.parent_page_id)?;
    let parent_header = parent.header();
    if parent_header.page_level != PageLevel::Internal {
        return Err(SedgeError::PageCorrupted {
            page_id: header.parent_page_id,
            reason: "leaf parent is not an internal page".to_string(),
        });
    }

    if parent_header.leftmost_child == leaf_id {
        info.is_leftmost = true;
        if parent_header.cell_count > 0 {
            let (key, child) = parent.internal_entry(0).ok_or_else(|| SedgeError::PageCorrupted {
                page_id: header.parent_page_id,
                reason: "unreadable internal entry 0".to_string(),
            })?;
            info.right_sibling = child;
            // For the leftmost child, entry 0's key is the right separator.
            info.right_separator_key = Bytes::copy_from_slice(key);
        }
        return Ok(info);
    }

    for i in 0..parent_header.cell_count {
        let (key, child) = parent.internal_entry(i).ok_or_else(|| SedgeError::PageCorrupted {
            page_id: header.parent_page_id,
            reason: format!("unreadable internal entry {}", i),
        })?;
        if child != leaf_id {
            continue;
        }

        info.left_sibling = if i == 0 {
            parent_header.leftmost_child
        } else {
            parent.internal_child(i - 1).unwrap_or(0)
        };

        if i + 1 < parent_header.cell_count {
            let (next_key, next_child) =
                parent.internal_entry(i + 1).ok_or_else(|| SedgeError::PageCorrupted {
                    page_id: header.parent_page_id,
                    reason: format!("unreadable internal entry {}", i + 1),
                })?;
            info.right_sibling = next_child;
            info.right_separator_key = Bytes::copy_from_slice(next_key);
        }

        info.separator_key = Bytes::copy_from_slice(key);
        return Ok(info);
    }

    Err(SedgeError::PageCorrupted {
        page_id: header.parent_page_id,
        reason: format!("leaf {} not found in parent", leaf_id),
    })
}

/// Returns true if the union of both pages' live records plus the combined
/// slot directory fits in one page.
fn can_merge_pages(left: &SlottedPage, right: &SlottedPage) -> bool {
    let records = left.live_record_bytes() + right.live_record_bytes();
    let slots = (left.cell_count() as usize + right.cell_count() as usize) * crate::page::SLOT_SIZE;
    PageHeader::SIZE + records + slots <= PAGE_SIZE
}

/// Merges `right` into `left`, rewriting the left page in place (which
/// compacts away deleted records), stitching the leaf chain, and freeing
/// the right page. The caller removes the right page's routing entry from
/// the parent afterwards.
fn merge_leaf_pages(
    table: &mut Table,
    left_id: PageId,
    left: &SlottedPage,
    right_id: PageId,
    right: &SlottedPage,
) -> Result<()> {
    let left_header = left.header();
    let right_header = right.header();
    let saved_prev = left_header.prev_page_id;
    let saved_parent = left_header.parent_page_id;
    let right_next = right_header.next_page_id;

    let mut records: Vec<Vec<u8>> = Vec::new();
    for page in [left, right] {
        for i in 0..page.cell_count() {
            let raw = page.slot_record(i).ok_or_else(|| SedgeError::PageCorrupted {
                page_id: page.page_id(),
                reason: format!("unreadable record {}", i),
            })?;
            records.push(raw.to_vec());
        }
    }

    let mut merged = SlottedPage::new(left_id, PageType::Data, PageLevel::Leaf);
    let mut merged_header = merged.header();
    merged_header.parent_page_id = saved_parent;
    merged_header.prev_page_id = saved_prev;
    merged_header.next_page_id = right_next;
    merged.set_header(&merged_header);

    for raw in &records {
        let offset = merged.write_raw(raw).ok_or_else(|| SedgeError::Internal(
            "merged records do not fit one page".to_string(),
        ))?;
        let slot = merged.cell_count();
        merged.insert_slot(slot, offset)?;
    }

    if right_next != 0 {
        table.update_header(right_next, |h| h.prev_page_id = left_id)?;
    }

    table.write_page(left_id, &merged)?;
    table.free_page(right_id)?;
    Ok(())
}

/// Removes the routing entry for a freed child, located by child page id.
///
/// Used when an internal page collapses and no separator key identifies
/// it (a childless node may have been its parent's leftmost).
fn remove_child_from_internal(table: &mut Table, parent_id: PageId, child_id: PageId) -> Result<()> {
    let mut parent = table.read_page(parent_id)?;
    if parent.page_level() != PageLevel::Internal {
        return Ok(());
    }

    let mut header = parent.header();
    if header.leftmost_child == child_id {
        if header.cell_count > 0 {
            let promoted = parent.internal_child(0).ok_or_else(|| SedgeError::PageCorrupted {
                page_id: parent_id,
                reason: "unreadable internal entry 0".to_string(),
            })?;
            header.leftmost_child = promoted;
            parent.set_header(&header);
            parent.remove_slot(0)?;
        } else {
            header.leftmost_child = 0;
            parent.set_header(&header);
        }
        return table.write_page(parent_id, &parent);
    }

    let count = parent.cell_count();
    for i in 0..count {
        if parent.internal_child(i) == Some(child_id) {
            parent.remove_slot(i)?;
            return table.write_page(parent_id, &parent);
        }
    }
    Ok(())
}

/// Removes the routing entry for a freed child from an internal page.
///
/// When the freed child was the leftmost, entry 0 is promoted into the
/// header pointer; otherwise the entry carrying a byte-identical key is
/// removed. Internal-node underflow is not propagated.
fn remove_from_internal(
    table: &mut Table,
    parent_id: PageId,
    key_to_remove: &[u8],
    deleted_child_page: PageId,
) -> Result<()> {
    let mut parent = table.read_page(parent_id)?;
    if parent.page_level() != PageLevel::Internal {
        return Ok(());
    }

    let mut header = parent.header();
    if deleted_child_page != 0 && header.leftmost_child == deleted_child_page {
        if header.cell_count > 0 {
            let promoted = parent.internal_child(0).ok_or_else(|| SedgeError::PageCorrupted {
                page_id: parent_id,
                reason: "unreadable internal entry 0".to_string(),
            })?;
            header.leftmost_child = promoted;
            parent.set_header(&header);
            parent.remove_slot(0)?;
        } else {
            header.leftmost_child = 0;
            parent.set_header(&header);
        }
        return table.write_page(parent_id, &parent);
    }

    let count = parent.cell_count();
    for i in 0..count {
        let Some(key) = parent.internal_key(i) else {
            continue;
        };
        if compare_keys(key, key_to_remove) == std::cmp::Ordering::Equal {
            parent.remove_slot(i)?;
            return table.write_page(parent_id, &parent);
        }
    }
    Ok(())
}
