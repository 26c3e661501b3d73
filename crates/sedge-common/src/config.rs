//! Configuration structures for SedgeDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of frames in a table's buffer pool.
pub const DEFAULT_POOL_FRAMES: usize = 128;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for table files.
    pub data_dir: PathBuf,
    /// Buffer pool size in number of frames, per table.
    pub buffer_pool_frames: usize,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            buffer_pool_frames: DEFAULT_POOL_FRAMES,
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the file path for a named table.
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.db", name))
    }
}
