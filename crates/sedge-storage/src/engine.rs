//! Storage engine façade.
//!
//! Maps table names to open [`Table`] handles and validates the byte-vector
//! arguments before they reach the tree. Tables are opened on demand and
//! flushed when closed, dropped, or when the engine itself is dropped.

use crate::btree::RangeScan;
use crate::page::SLOT_SIZE;
use crate::record::record_size;
use crate::table::Table;
use bytes::Bytes;
use sedge_common::config::StorageConfig;
use sedge_common::page::{PageHeader, PAGE_SIZE};
use sedge_common::{Result, SedgeError};
use std::collections::HashMap;

/// The embedded key/value storage engine.
///
/// Each table is an independent file holding one B+Tree; all operations
/// address tables by name.
pub struct StorageEngine {
    config: StorageConfig,
    open_tables: HashMap<String, Table>,
}

impl StorageEngine {
    /// Creates an engine over the configured data directory.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            open_tables: HashMap::new(),
        }
    }

    /// Creates an engine with the default configuration.
    pub fn with_data_dir(data_dir: impl Into<std::path::PathBuf>) -> Self {
        Self::new(StorageConfig {
            data_dir: data_dir.into(),
            ..StorageConfig::default()
        })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Creates a new table file.
    pub fn create_table(&mut self, name: &str) -> Result<()> {
        if self.open_tables.contains_key(name) {
            return Err(SedgeError::TableAlreadyExists(name.to_string()));
        }
        Table::create(&self.config, name)
    }

    /// Drops a table: closes it if open and deletes its file.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        if let Some(mut table) = self.open_tables.remove(name) {
            table.flush_all();
        }

        let path = self.config.table_path(name);
        if !path.exists() {
            return Err(SedgeError::TableNotFound(name.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Opens a table, or returns the already-open handle.
    pub fn open_table(&mut self, name: &str) -> Result<&mut Table> {
        if !self.open_tables.contains_key(name) {
            let table = Table::open(&self.config, name)?;
            self.open_tables.insert(name.to_string(), table);
        }
        Ok(self.open_tables.get_mut(name).unwrap())
    }

    /// Closes a table, flushing its dirty pages. Returns false if the
    /// table was not open.
    pub fn close_table(&mut self, name: &str) -> bool {
        match self.open_tables.remove(name) {
            Some(mut table) => {
                table.flush_all();
                true
            }
            None => false,
        }
    }

    /// Returns true if the table is currently open.
    pub fn is_open(&self, name: &str) -> bool {
        self.open_tables.contains_key(name)
    }

    /// Inserts a record. Rejects empty keys, empty values, either side
    /// longer than `u16::MAX`, records too large for one page, and
    /// duplicate keys.
    pub fn insert(&mut self, name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        validate_record(key, value)?;
        self.open_table(name)?.insert(key, value)
    }

    /// Looks up a record, returning an owned copy of its value.
    pub fn get(&mut self, name: &str, key: &[u8]) -> Result<Bytes> {
        validate_key(key)?;
        self.open_table(name)?.get(key)
    }

    /// Replaces the value stored under an existing key.
    ///
    /// In place (atomic) when the value length is unchanged; otherwise
    /// delete-then-insert, where a failed re-insert loses the record.
    pub fn update(&mut self, name: &str, key: &[u8], new_value: &[u8]) -> Result<()> {
        validate_record(key, new_value)?;
        self.open_table(name)?.update(key, new_value)
    }

    /// Deletes a record.
    pub fn delete(&mut self, name: &str, key: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.open_table(name)?.delete(key)
    }

    /// Scans a whole table in ascending key order.
    pub fn scan_table(&mut self, name: &str) -> Result<RangeScan<'_>> {
        self.open_table(name)?.scan()
    }

    /// Scans keys in `[start, end]`; a missing bound is unbounded.
    pub fn range_scan(
        &mut self,
        name: &str,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<RangeScan<'_>> {
        self.open_table(name)?.range_scan(start, end)
    }

    /// Flushes every open table. Returns the number of pages written.
    pub fn flush_all(&mut self) -> usize {
        self.open_tables
            .values_mut()
            .map(|table| table.flush_all())
            .sum()
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        self.flush_all();
    }
}

/// Largest record that fits an empty leaf: page minus header minus one slot.
const MAX_RECORD_SIZE: usize = PAGE_SIZE - PageHeader::SIZE - SLOT_SIZE;

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(SedgeError::InvalidArgument("empty key".to_string()));
    }
    if key.len() > u16::MAX as usize {
        return Err(SedgeError::InvalidArgument(format!(
            "key of {} bytes exceeds maximum of {}",
            key.len(),
            u16::MAX
        )));
    }
    Ok(())
}

fn validate_record(key: &[u8], value: &[u8]) -> Result<()> {
    validate_key(key)?;
    if value.is_empty() {
        return Err(SedgeError::InvalidArgument("empty value".to_string()));
    }
    if value.len() > u16::MAX as usize {
        return Err(SedgeError::InvalidArgument(format!(
            "value of {} bytes exceeds maximum of {}",
            value.len(),
            u16::MAX
        )));
    }
    if record_size(key.len() as u16, value.len() as u16) > MAX_RECORD_SIZE {
        return Err(SedgeError::InvalidArgument(format!(
            "record of {} bytes does not fit a {}-byte page",
            record_size(key.len() as u16, value.len() as u16),
            PAGE_SIZE
        )));
    }
    Ok(())
}
