//! Record store: product drafts keyed by product identifier.
//!
//! Steps never overwrite a draft. They call [`RecordStore::merge`] with a
//! [`DraftPatch`] so that two steps writing different fields of the same
//! product do not clobber each other.

use crate::store::{read_json, write_json_atomic, StoreError, StoreResult};
use async_trait::async_trait;
use pc_protocol::product_models::{DraftPatch, ProductDraft};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a draft. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, draft: ProductDraft) -> StoreResult<()>;

    /// Merge `patch` into the draft `id`, creating it if absent, and return
    /// the merged record.
    async fn merge(&self, id: &str, patch: &DraftPatch) -> StoreResult<ProductDraft>;

    async fn get(&self, id: &str) -> StoreResult<Option<ProductDraft>>;
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    drafts: Mutex<HashMap<String, ProductDraft>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, draft: ProductDraft) -> StoreResult<()> {
        validate_id(&draft.id)?;
        let mut drafts = self.drafts.lock().await;
        if drafts.contains_key(&draft.id) {
            return Err(StoreError::AlreadyExists { key: draft.id });
        }
        drafts.insert(draft.id.clone(), draft);
        Ok(())
    }

    async fn merge(&self, id: &str, patch: &DraftPatch) -> StoreResult<ProductDraft> {
        validate_id(id)?;
        let mut drafts = self.drafts.lock().await;
        let draft = drafts
            .entry(id.to_string())
            .or_insert_with(|| ProductDraft::new(id));
        draft.merge(patch);
        Ok(draft.clone())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ProductDraft>> {
        Ok(self.drafts.lock().await.get(id).cloned())
    }
}

/// Record store keeping one JSON document per product under a directory.
///
/// Read-modify-write cycles are serialized by a store-wide lock, which makes
/// merges atomic within one process.
pub struct FsRecordStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, id: &str) -> StoreResult<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn insert(&self, draft: ProductDraft) -> StoreResult<()> {
        let path = self.path_for(&draft.id)?;
        let _guard = self.write_lock.lock().await;
        if read_json::<ProductDraft>(&path).await?.is_some() {
            return Err(StoreError::AlreadyExists { key: draft.id });
        }
        write_json_atomic(&path, &draft).await
    }

    async fn merge(&self, id: &str, patch: &DraftPatch) -> StoreResult<ProductDraft> {
        let path = self.path_for(id)?;
        let _guard = self.write_lock.lock().await;
        let mut draft = read_json::<ProductDraft>(&path)
            .await?
            .unwrap_or_else(|| ProductDraft::new(id));
        draft.merge(patch);
        write_json_atomic(&path, &draft).await?;
        Ok(draft)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ProductDraft>> {
        let path = self.path_for(id)?;
        read_json(&path).await
    }
}

fn validate_id(id: &str) -> StoreResult<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey {
            key: id.to_string(),
            reason: "product id must be a non-empty single path segment".to_string(),
        })
    }
}
