//! Buffer pool manager.

use crate::frame::{Frame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{LruReplacer, Replacer};
use sedge_common::config::DEFAULT_POOL_FRAMES;
use sedge_common::page::{PageId, PAGE_SIZE};
use sedge_common::{Result, SedgeError};
use sysinfo::System;

/// A dirty page that was evicted from the buffer pool.
///
/// The caller must write it to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_frames: DEFAULT_POOL_FRAMES,
        }
    }
}

impl BufferPoolConfig {
    /// Creates a configuration sized to 25% of available system RAM,
    /// floored at the default frame count.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(DEFAULT_POOL_FRAMES);

        Self { num_frames }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for cold misses
/// - LRU replacement for eviction
/// - Pin counting via RAII guards
///
/// The pool holds no disk handle: a cache miss is serviced by the caller
/// reading the page and handing the bytes to [`BufferPool::install`], and
/// an evicted dirty page comes back as an [`EvictedPage`] the caller must
/// persist. Flushing likewise goes through a caller-supplied write function.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<Frame>,
    /// Page ID to frame ID mapping.
    page_table: PageTable,
    /// List of never-used or freed frame IDs.
    free_list: Vec<FrameId>,
    /// Page replacement policy.
    replacer: LruReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames).map(|_| Frame::new()).collect();
        // Pop from the back, so reverse order hands out frame 0 first.
        let free_list: Vec<_> = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list,
            replacer: LruReplacer::new(),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.free_list.len()
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is resident in the pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Returns the number of frames with outstanding pins.
    pub fn pinned_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_pinned()).count()
    }

    /// Fetches a resident page, pinning it for the lifetime of the guard.
    ///
    /// Returns None for pages that are not resident; the caller is expected
    /// to read the page from disk and [`install`](Self::install) it first.
    pub fn fetch(&mut self, page_id: PageId) -> Option<PageGuard<'_>> {
        let frame_id = self.page_table.get(page_id)?;
        let frame = &mut self.frames[frame_id.0 as usize];
        frame.pin();
        self.replacer.set_evictable(frame_id, false);
        Some(PageGuard {
            pool: self,
            page_id,
            frame_id,
            dirty: false,
        })
    }

    /// Installs page bytes into the pool, unpinned.
    ///
    /// If the page is already resident its frame is overwritten in place.
    /// Otherwise a frame is acquired (free frame preferred, else the LRU
    /// unpinned victim); a dirty victim's bytes are returned for the caller
    /// to write back. Fails with `BufferPoolFull` when every frame is pinned.
    pub fn install(
        &mut self,
        page_id: PageId,
        data: &[u8],
        dirty: bool,
    ) -> Result<Option<EvictedPage>> {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &mut self.frames[frame_id.0 as usize];
            frame.copy_from(data);
            if dirty {
                frame.set_dirty(true);
            }
            self.replacer.record_access(frame_id);
            return Ok(None);
        }

        let (frame_id, evicted) = self.allocate_frame()?;

        let frame = &mut self.frames[frame_id.0 as usize];
        frame.copy_from(data);
        frame.set_page_id(page_id);
        frame.set_dirty(dirty);

        self.page_table.insert(page_id, frame_id);
        self.replacer.set_evictable(frame_id, true);

        Ok(evicted)
    }

    /// Acquires a frame for a new page: free list first, then eviction.
    fn allocate_frame(&mut self) -> Result<(FrameId, Option<EvictedPage>)> {
        if let Some(frame_id) = self.free_list.pop() {
            self.frames[frame_id.0 as usize].reset();
            return Ok((frame_id, None));
        }

        let frames = &self.frames;
        let victim = self
            .replacer
            .evict(&mut |fid| frames[fid.0 as usize].pin_count() == 0);

        let Some(victim_id) = victim else {
            return Err(SedgeError::BufferPoolFull);
        };

        let frame = &mut self.frames[victim_id.0 as usize];
        let evicted = match (frame.is_dirty(), frame.page_id()) {
            (true, Some(old_page_id)) => {
                let mut data = Box::new([0u8; PAGE_SIZE]);
                data.copy_from_slice(frame.data());
                Some(EvictedPage {
                    page_id: old_page_id,
                    data,
                })
            }
            _ => None,
        };

        if let Some(old_page_id) = frame.page_id() {
            self.page_table.remove(old_page_id);
        }
        frame.reset();

        Ok((victim_id, evicted))
    }

    /// Unpins a page, OR-ing in the dirty flag.
    ///
    /// When the pin count reaches zero the page becomes an eviction
    /// candidate. Returns false if the page is not resident or was already
    /// unpinned.
    pub fn unpin_page(&mut self, page_id: PageId, dirty: bool) -> bool {
        let Some(frame_id) = self.page_table.get(page_id) else {
            return false;
        };
        let frame = &mut self.frames[frame_id.0 as usize];

        if frame.pin_count() == 0 {
            return false;
        }

        if dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Flushes a resident page through `flush_fn` and clears its dirty bit.
    ///
    /// Returns Ok(true) if the page was written, Ok(false) if it was clean
    /// or not resident.
    pub fn flush_page<F>(&mut self, page_id: PageId, mut flush_fn: F) -> Result<bool>
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        let Some(frame_id) = self.page_table.get(page_id) else {
            return Ok(false);
        };
        let frame = &mut self.frames[frame_id.0 as usize];

        if !frame.is_dirty() {
            return Ok(false);
        }

        flush_fn(page_id, frame.data())?;
        frame.set_dirty(false);
        Ok(true)
    }

    /// Flushes every resident dirty page, best effort.
    ///
    /// A failed write leaves that page dirty and moves on to its siblings.
    /// Returns the number of pages written.
    pub fn flush_all<F>(&mut self, mut flush_fn: F) -> usize
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        let resident: Vec<_> = self.page_table.iter().collect();

        let mut flushed = 0;
        for (page_id, frame_id) in resident {
            let frame = &mut self.frames[frame_id.0 as usize];
            if frame.is_dirty() && flush_fn(page_id, frame.data()).is_ok() {
                frame.set_dirty(false);
                flushed += 1;
            }
        }
        flushed
    }

    /// Drops a resident, unpinned page from the pool without writing it back.
    ///
    /// Returns false if the page is pinned or not resident.
    pub fn delete_page(&mut self, page_id: PageId) -> bool {
        let Some(frame_id) = self.page_table.get(page_id) else {
            return false;
        };

        if self.frames[frame_id.0 as usize].is_pinned() {
            return false;
        }

        self.page_table.remove(page_id);
        self.replacer.remove(frame_id);
        self.frames[frame_id.0 as usize].reset();
        self.free_list.push(frame_id);
        true
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;
        for frame in &self.frames {
            if frame.is_pinned() {
                pinned_frames += 1;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_list.len(),
            used_frames: self.page_table.len(),
            pinned_frames,
            dirty_frames,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

/// RAII pin on a buffer page.
///
/// Holding the guard keeps the frame resident; dropping it unpins the page,
/// carrying the dirty flag accumulated through [`data_mut`](Self::data_mut)
/// or [`mark_dirty`](Self::mark_dirty). This guarantees every fetch is
/// paired with exactly one unpin on every control path.
pub struct PageGuard<'a> {
    pool: &'a mut BufferPool,
    page_id: PageId,
    frame_id: FrameId,
    dirty: bool,
}

impl PageGuard<'_> {
    /// Returns the pinned page's id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        self.pool.frames[self.frame_id.0 as usize].data()
    }

    /// Returns mutable page data and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        self.dirty = true;
        self.pool.frames[self.frame_id.0 as usize].data_mut()
    }

    /// Marks the page dirty without touching the data.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        let dirty = self.dirty;
        self.pool.unpin_page(self.page_id, dirty);
    }
}
