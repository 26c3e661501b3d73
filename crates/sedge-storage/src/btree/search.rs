//! Tree descent and point lookup.

use super::MAX_TREE_DEPTH;
use crate::page::SlottedPage;
use crate::table::Table;
use bytes::Bytes;
use sedge_common::page::{PageId, PageLevel};
use sedge_common::{Result, SedgeError};

/// Descends from the root to the leaf that owns `key`.
///
/// Each visited page is copied out of its frame and unpinned before the
/// descent continues, so no pins are held across levels. Returns the leaf
/// page id together with a local copy of the leaf.
pub(crate) fn find_leaf_page(table: &mut Table, key: &[u8]) -> Result<(PageId, SlottedPage)> {
    let mut page_id = table.root_page;
    if page_id == 0 {
        return Err(SedgeError::KeyNotFound);
    }

    for _ in 0..MAX_TREE_DEPTH {
        let page = table.read_page(page_id)?;

        match page.page_level() {
            PageLevel::Leaf => return Ok((page_id, page)),
            PageLevel::Internal => {
                let next_page_id = page.find_child(key);
                if next_page_id == 0 {
                    return Err(SedgeError::PageCorrupted {
                        page_id,
                        reason: "internal page routed to page 0".to_string(),
                    });
                }
                page_id = next_page_id;
            }
            PageLevel::None => {
                return Err(SedgeError::PageCorrupted {
                    page_id,
                    reason: "tree descent reached a non-tree page".to_string(),
                })
            }
        }
    }

    Err(SedgeError::Internal(
        "tree descent exceeded maximum depth".to_string(),
    ))
}

/// Descends to the leftmost leaf by always following the leftmost child.
pub(crate) fn find_leftmost_leaf_page(table: &mut Table) -> Result<(PageId, SlottedPage)> {
    let mut page_id = table.root_page;
    if page_id == 0 {
        return Err(SedgeError::KeyNotFound);
    }

    for _ in 0..MAX_TREE_DEPTH {
        let page = table.read_page(page_id)?;

        match page.page_level() {
            PageLevel::Leaf => return Ok((page_id, page)),
            PageLevel::Internal => {
                let next_page_id = page.header().leftmost_child;
                if next_page_id == 0 {
                    return Err(SedgeError::PageCorrupted {
                        page_id,
                        reason: "internal page has no leftmost child".to_string(),
                    });
                }
                page_id = next_page_id;
            }
            PageLevel::None => {
                return Err(SedgeError::PageCorrupted {
                    page_id,
                    reason: "tree descent reached a non-tree page".to_string(),
                })
            }
        }
    }

    Err(SedgeError::Internal(
        "tree descent exceeded maximum depth".to_string(),
    ))
}

impl Table {
    /// Looks up `key`, returning an owned copy of its value.
    pub fn get(&mut self, key: &[u8]) -> Result<Bytes> {
        if self.root_page == 0 {
            return Err(SedgeError::KeyNotFound);
        }

        let (_, leaf) = find_leaf_page(self, key)?;
        let Ok(index) = leaf.search(key) else {
            return Err(SedgeError::KeyNotFound);
        };

        let Some(value) = leaf.slot_value(index as u16) else {
            return Err(SedgeError::KeyNotFound);
        };
        Ok(Bytes::copy_from_slice(value))
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&mut self, key: &[u8]) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(SedgeError::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
