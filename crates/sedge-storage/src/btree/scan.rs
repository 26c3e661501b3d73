//! Sibling-linked forward range scans.

use super::search::{find_leaf_page, find_leftmost_leaf_page};
use crate::page::SlottedPage;
use crate::record::compare_keys;
use crate::table::Table;
use bytes::Bytes;
use sedge_common::Result;
use std::cmp::Ordering;

/// A lazy, finite, non-restartable iterator over `(key, value)` pairs in
/// ascending key order.
///
/// The scan walks the current leaf's slots, then follows `next_page_id`
/// through the buffer pool, copying each leaf locally so no pin is held
/// between steps. Bounds are inclusive on both sides; a missing bound is
/// unbounded. An I/O failure yields one final `Err` item and ends the
/// iteration.
pub struct RangeScan<'a> {
    table: &'a mut Table,
    page: Option<SlottedPage>,
    index: u16,
    end: Option<Bytes>,
    done: bool,
}

impl Iterator for RangeScan<'_> {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let page = self.page.as_ref()?;
            let header = page.header();

            while self.index < header.cell_count {
                let i = self.index;
                self.index += 1;

                // Slots that fail their bounds checks are skipped.
                let (Some(key), Some(value)) = (page.slot_key(i), page.slot_value(i)) else {
                    continue;
                };

                if let Some(end) = &self.end {
                    if compare_keys(key, end) == Ordering::Greater {
                        self.done = true;
                        return None;
                    }
                }

                return Some(Ok((
                    Bytes::copy_from_slice(key),
                    Bytes::copy_from_slice(value),
                )));
            }

            let next_page_id = header.next_page_id;
            if next_page_id == 0 {
                self.done = true;
                return None;
            }

            match self.table.read_page(next_page_id) {
                Ok(next) => {
                    self.page = Some(next);
                    self.index = 0;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl Table {
    /// Scans keys in `[start, end]`, either bound optional.
    ///
    /// An empty tree yields an empty scan.
    pub fn range_scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<RangeScan<'_>> {
        let end = end.map(Bytes::copy_from_slice);

        if self.root_page == 0 {
            return Ok(RangeScan {
                table: self,
                page: None,
                index: 0,
                end,
                done: false,
            });
        }

        let (page, index) = match start {
            None => {
                let (_, page) = find_leftmost_leaf_page(self)?;
                (page, 0)
            }
            Some(start_key) => {
                let (_, page) = find_leaf_page(self, start_key)?;
                // First slot at or above the start bound.
                let index = match page.search(start_key) {
                    Ok(found) => found,
                    Err(insertion_point) => insertion_point,
                };
                (page, index as u16)
            }
        };

        Ok(RangeScan {
            table: self,
            page: Some(page),
            index,
            end,
            done: false,
        })
    }

    /// Scans the whole table in ascending key order.
    pub fn scan(&mut self) -> Result<RangeScan<'_>> {
        self.range_scan(None, None)
    }

    /// Collects a range scan into owned pairs, for callers that want the
    /// whole result set at once.
    pub fn collect_range(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<Vec<(Bytes, Bytes)>> {
        self.range_scan(start, end)?.collect()
    }
}
