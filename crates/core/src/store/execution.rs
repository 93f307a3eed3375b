//! Execution store: durable workflow execution records.
//!
//! The orchestrator saves a full snapshot of an execution after every
//! change, so a restarted process can list interrupted executions and
//! resume them.

use crate::store::{read_json, write_json_atomic, StoreError, StoreResult};
use async_trait::async_trait;
use pc_protocol::workflow_models::WorkflowExecution;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save(&self, execution: &WorkflowExecution) -> StoreResult<()>;
    async fn load(&self, execution_id: Uuid) -> StoreResult<Option<WorkflowExecution>>;
    /// All stored executions, oldest first.
    async fn list(&self) -> StoreResult<Vec<WorkflowExecution>>;
}

#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> StoreResult<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(&execution_id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<WorkflowExecution>> {
        let mut all: Vec<_> = self.executions.read().await.values().cloned().collect();
        all.sort_by_key(|e| e.started_at);
        Ok(all)
    }
}

/// One `{execution_id}.json` document per execution under a directory.
pub struct FsExecutionStore {
    dir: PathBuf,
}

impl FsExecutionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, execution_id: Uuid) -> PathBuf {
        self.dir.join(format!("{execution_id}.json"))
    }
}

#[async_trait]
impl ExecutionStore for FsExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        write_json_atomic(&self.path_for(execution.execution_id), execution).await
    }

    async fn load(&self, execution_id: Uuid) -> StoreResult<Option<WorkflowExecution>> {
        read_json(&self.path_for(execution_id)).await
    }

    async fn list(&self) -> StoreResult<Vec<WorkflowExecution>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(execution) = read_json::<WorkflowExecution>(&path).await? {
                all.push(execution);
            }
        }

        all.sort_by_key(|e| e.started_at);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pc_protocol::workflow_models::{ExecutionInput, ExecutionStatus, Topology};
    use tempfile::tempdir;

    fn sample_execution() -> WorkflowExecution {
        WorkflowExecution {
            execution_id: Uuid::new_v4(),
            topology: Topology::AttributionWorkflow,
            input: ExecutionInput::new("input/bag.png", "P7"),
            status: ExecutionStatus::Running,
            reason: None,
            error: None,
            history: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    #[tokio::test]
    async fn test_fs_store_save_load_list() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = FsExecutionStore::new(dir.path().join("executions"));

        assert!(store.list().await.unwrap().is_empty());

        let execution = sample_execution();
        store.save(&execution).await.unwrap();

        let loaded = store
            .load(execution.execution_id)
            .await
            .unwrap()
            .expect("execution should be stored");
        assert_eq!(loaded, execution);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let store = InMemoryExecutionStore::new();
        let mut execution = sample_execution();
        store.save(&execution).await.unwrap();

        execution.status = ExecutionStatus::Succeeded;
        execution.ended_at = Some(Utc::now());
        store.save(&execution).await.unwrap();

        let loaded = store.load(execution.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Succeeded);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
