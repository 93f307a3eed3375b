//! Persistence primitives used by the orchestrator and its steps.
//!
//! - [`object`]: blob storage addressed by key paths (`input/*`, `output/*`, ...)
//! - [`record`]: product drafts keyed by product identifier
//! - [`execution`]: durable workflow execution records
//!
//! Each store is a trait with an in-memory implementation for tests and a
//! filesystem implementation rooted in the project directory.

pub mod error;
pub mod execution;
pub mod object;
pub mod record;

pub use error::{StoreError, StoreResult};
pub use execution::{ExecutionStore, FsExecutionStore, InMemoryExecutionStore};
pub use object::{FsObjectStore, InMemoryObjectStore, ObjectStore};
pub use record::{FsRecordStore, InMemoryRecordStore, RecordStore};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reject keys that are empty, absolute, or contain `..` / empty segments.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(invalid("key must be a relative '/'-separated path"));
    }
    if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(invalid("key contains an empty or relative segment"));
    }
    Ok(())
}

/// Write `value` as pretty JSON to `path`, replacing any previous file
/// atomically (temp file in the same directory, then rename).
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes_atomic(path, body).await
}

pub(crate) async fn write_bytes_atomic(path: &Path, body: Vec<u8>) -> StoreResult<()> {
    let target = path.to_path_buf();
    let join_path = target.clone();

    tokio::task::spawn_blocking(move || -> StoreResult<()> {
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let io_err = |source| StoreError::Io {
            path: dir.clone(),
            source,
        };

        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&body).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&target).map_err(|e| StoreError::Io {
            path: target.clone(),
            source: e.error,
        })?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Io {
        path: join_path,
        source: std::io::Error::other(e),
    })?
}

/// Read a JSON document, returning `None` when the file does not exist.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })
}
