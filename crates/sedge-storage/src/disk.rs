//! Disk manager for page-level file I/O.

use sedge_common::page::{PageId, PAGE_SIZE};
use sedge_common::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Manages reading and writing pages of a single table file.
///
/// Pages live at byte offset `page_id * PAGE_SIZE`. The disk manager is
/// stateless beyond the owned file handle; caching and dirty tracking are
/// the buffer pool's job.
pub struct DiskManager {
    /// The table file handle.
    file: File,
    /// Path to the file.
    path: PathBuf,
    /// Whether flush() issues an fsync.
    fsync_enabled: bool,
}

impl DiskManager {
    /// Opens (or creates) the table file at `path`.
    pub fn open(path: &Path, fsync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            fsync_enabled,
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a page into `buf`.
    ///
    /// A short read at end of file zero-fills the remainder, so reading a
    /// page past the end of the file yields a zero page.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut total_read = 0;
        while total_read < PAGE_SIZE {
            let n = self.file.read(&mut buf[total_read..])?;
            if n == 0 {
                break;
            }
            total_read += n;
        }

        if total_read < PAGE_SIZE {
            buf[total_read..].fill(0);
        }
        Ok(())
    }

    /// Writes a page, extending the file first if needed.
    ///
    /// Extension writes a single zero byte at the required length so the
    /// subsequent positioned write cannot land past the end of file.
    pub fn write_page(&mut self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        let offset = page_id as u64 * PAGE_SIZE as u64;
        let required_size = offset + PAGE_SIZE as u64;

        let current_size = self.file.seek(SeekFrom::End(0))?;
        if current_size < required_size {
            self.file.seek(SeekFrom::Start(required_size - 1))?;
            self.file.write_all(&[0u8])?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Flushes pending writes to stable storage.
    ///
    /// A no-op unless fsync was enabled at open time.
    pub fn flush(&mut self) -> Result<()> {
        if self.fsync_enabled {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskManager")
            .field("path", &self.path)
            .field("fsync_enabled", &self.fsync_enabled)
            .finish()
    }
}
