//! Test fixtures for building managers over in-memory or on-disk stores.

use pc_core::config::ProjectLayout;
use pc_core::state::StateManager;
use pc_core::steps::{StepContext, StepRegistry, StubInference};
use pc_core::store::{
    ExecutionStore, FsExecutionStore, FsObjectStore, FsRecordStore, InMemoryExecutionStore,
    InMemoryObjectStore, InMemoryRecordStore, ObjectStore, RecordStore,
};
use pc_protocol::config_models::{OrchestratorConfig, SameProductPolicy};
use pc_protocol::ipc::Event;
use pc_protocol::workflow_models::{Label, StepOutput};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Bytes standing in for a JPEG upload.
pub const SHIRT_IMAGE: &[u8] = b"\xff\xd8\xff\xe0 fake shirt jpeg";

/// A manager together with the stores it was built over.
#[allow(dead_code)]
pub struct Harness {
    pub manager: StateManager,
    pub objects: Arc<dyn ObjectStore>,
    pub records: Arc<dyn RecordStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub events: broadcast::Receiver<Event>,
}

/// Defaults with short backoff so retry tests do not crawl.
#[allow(dead_code)]
pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.retry.initial_backoff_ms = 10;
    config.retry.max_backoff_ms = 100;
    config
}

#[allow(dead_code)]
pub fn concurrent_config() -> OrchestratorConfig {
    let mut config = fast_config();
    config.same_product_policy = SameProductPolicy::Concurrent;
    config
}

#[allow(dead_code)]
pub fn builtin_registry() -> StepRegistry {
    StepRegistry::builtin(Arc::new(StubInference::new()))
}

/// Labels as the label detection step reports them for a shirt.
#[allow(dead_code)]
pub fn shirt_labels() -> StepOutput {
    StepOutput::Labels {
        labels: vec![
            Label::new("Shirt", 97.4)
                .with_parents(vec!["Apparel".to_string(), "Clothing".to_string()]),
            Label::new("Clothing", 99.1),
        ],
    }
}

/// Build a manager over fresh in-memory stores with `input/shirt1.jpg`
/// already uploaded.
#[allow(dead_code)]
pub async fn in_memory_harness(config: OrchestratorConfig, registry: StepRegistry) -> Harness {
    let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
    objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .expect("Failed to seed object store");

    harness_over(
        config,
        registry,
        objects,
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryExecutionStore::new()),
    )
}

/// Build a manager over the filesystem stores of a project root.
#[allow(dead_code)]
pub fn fs_harness(root: &Path, config: OrchestratorConfig, registry: StepRegistry) -> Harness {
    let layout = ProjectLayout::new(root);
    harness_over(
        config,
        registry,
        Arc::new(FsObjectStore::new(layout.objects_dir())),
        Arc::new(FsRecordStore::new(layout.records_dir())),
        Arc::new(FsExecutionStore::new(layout.executions_dir())),
    )
}

#[allow(dead_code)]
pub fn harness_over(
    config: OrchestratorConfig,
    registry: StepRegistry,
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    executions: Arc<dyn ExecutionStore>,
) -> Harness {
    let (events_tx, events) = broadcast::channel(1024);
    let context = StepContext::new(Arc::clone(&objects), Arc::clone(&records));
    let manager = StateManager::new(config, registry, context, Arc::clone(&executions), events_tx)
        .expect("Failed to create StateManager");

    Harness {
        manager,
        objects,
        records,
        executions,
        events,
    }
}
