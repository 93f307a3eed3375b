//! Error types for the object, record and execution stores.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing a store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object or record exists under the key.
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// An insert targeted a key that already holds a record.
    #[error("Record already exists: {key}")]
    AlreadyExists { key: String },

    /// The key is empty, absolute, or escapes the store root.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Filesystem access failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A persisted document could not be encoded or decoded.
    #[error("Failed to (de)serialize {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Type alias for Result with StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
