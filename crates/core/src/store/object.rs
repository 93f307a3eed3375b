//! Object store: blobs addressed by key paths.
//!
//! Key conventions used by the pipeline:
//! - `input/*`: uploaded source images, read-only to steps
//! - `human-model-images/*`: model images, read-write for the try-on step
//! - `output/*`: generated images, written by the try-on step

use crate::store::{validate_key, write_bytes_atomic, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use walkdir::WalkDir;

pub const INPUT_PREFIX: &str = "input/";
pub const HUMAN_MODEL_PREFIX: &str = "human-model-images/";
pub const OUTPUT_PREFIX: &str = "output/";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>>;
    async fn put(&self, key: &str, body: Vec<u8>) -> StoreResult<()>;
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> StoreResult<()> {
        validate_key(key)?;
        self.objects.write().await.insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }
}

/// Object store backed by a directory; keys map to relative file paths.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                StoreError::Io { path, source }
            }
        })
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> StoreResult<()> {
        let path = self.path_for(key)?;
        write_bytes_atomic(&path, body).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || -> StoreResult<Vec<String>> {
            if !root.exists() {
                return Ok(Vec::new());
            }

            let mut keys = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1) {
                let entry = entry.map_err(|e| StoreError::Io {
                    path: root.clone(),
                    source: e.into(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                // Temp files from in-flight atomic writes are not objects
                if key.starts_with(&prefix) && !relative_is_temp(relative) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(|e| StoreError::Io {
            path: self.root.clone(),
            source: std::io::Error::other(e),
        })?
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }
}

fn relative_is_temp(relative: &Path) -> bool {
    relative
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(".tmp"))
}
