//! Error types for SedgeDB.

use thiserror::Error;

/// Result type alias using SedgeError.
pub type Result<T> = std::result::Result<T, SedgeError>;

/// Errors that can occur in SedgeDB operations.
#[derive(Debug, Error)]
pub enum SedgeError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Buffer pool errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: u32 },

    #[error("Page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: u32, reason: String },

    // Page / record errors
    #[error("Page full, unable to insert record")]
    PageFull,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Table errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("No free pages left in table file")]
    OutOfPages,

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
