//! State manager for coordinating workflow executions.
//!
//! The StateManager is the entry point of the orchestrator. It validates and
//! starts executions, runs each one as an independent background task,
//! answers status queries, and resumes executions interrupted by a restart.

use crate::engine::WorkflowEngine;
use crate::state::execution::create_execution;
use crate::state::recorder::{ExecutionRecorder, SharedExecution};
use crate::steps::base::StepContext;
use crate::steps::registry::StepRegistry;
use crate::store::object::{HUMAN_MODEL_PREFIX, INPUT_PREFIX};
use crate::store::{validate_key, ExecutionStore};
use crate::workflow::WorkflowDefinitions;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use pc_protocol::config_models::{OrchestratorConfig, SameProductPolicy};
use pc_protocol::ipc::{Event, Op, Response};
use pc_protocol::workflow_models::{
    AttemptOutcome, ExecutionInput, ExecutionStatus, ExecutionSummary, Topology,
    WorkflowExecution,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Completion signals of the latest execution started per product id.
type ProductQueue = Arc<Mutex<HashMap<String, watch::Receiver<bool>>>>;

/// Manages all workflow executions of this process.
///
/// The StateManager provides a centralized interface for:
/// - Starting catalog and attribution workflows
/// - Querying and listing executions
/// - Recovering executions left running by a previous process
pub struct StateManager {
    /// Executions this process is driving, indexed by id. A run drops its
    /// entry once the execution is terminal; the store answers from then on.
    executions: Arc<Mutex<HashMap<Uuid, SharedExecution>>>,

    /// Background tasks driving the executions. Each task removes its own
    /// handle when it ends.
    tasks: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,

    /// Orders executions that target the same product.
    product_queue: ProductQueue,

    engine: Arc<WorkflowEngine>,
    recorder: ExecutionRecorder,
    config: OrchestratorConfig,
}

impl StateManager {
    /// Create a new StateManager.
    ///
    /// # Arguments
    ///
    /// * `config` - Orchestrator configuration
    /// * `registry` - Step implementations
    /// * `context` - Store capabilities handed to the steps
    /// * `store` - Durable execution store
    /// * `events_tx` - Channel for publishing events to front-ends
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in workflow definitions do not validate.
    pub fn new(
        config: OrchestratorConfig,
        registry: StepRegistry,
        context: StepContext,
        store: Arc<dyn ExecutionStore>,
        events_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let definitions =
            Arc::new(WorkflowDefinitions::standard().context("Invalid workflow definitions")?);
        let recorder = ExecutionRecorder::new(store, events_tx);
        let engine = Arc::new(WorkflowEngine::new(
            definitions,
            registry,
            context,
            recorder.clone(),
            &config,
        ));

        Ok(Self {
            executions: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            product_queue: Arc::new(Mutex::new(HashMap::new())),
            engine,
            recorder,
            config,
        })
    }

    /// Subscribe to execution events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.recorder.subscribe()
    }

    /// Start the catalog workflow (labels, attribution, try-on).
    ///
    /// Returns the execution id as soon as the execution is persisted; the
    /// workflow itself runs in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid or the execution cannot be
    /// persisted. No execution is created in that case.
    pub async fn start_catalog_workflow(&self, input: ExecutionInput) -> Result<Uuid> {
        self.start(Topology::CatalogWorkflow, input).await
    }

    /// Start the attribution-only workflow.
    ///
    /// # Errors
    ///
    /// Same as [`StateManager::start_catalog_workflow`].
    pub async fn start_attribution_workflow(
        &self,
        object_key: String,
        product_id: String,
    ) -> Result<Uuid> {
        self.start(
            Topology::AttributionWorkflow,
            ExecutionInput::new(object_key, product_id),
        )
        .await
    }

    async fn start(&self, topology: Topology, input: ExecutionInput) -> Result<Uuid> {
        validate_input(topology, &input)?;

        let execution = create_execution(topology, input, Utc::now());
        let execution_id = execution.execution_id;
        let deadline = Instant::now() + self.config.execution_timeout();

        self.recorder
            .record_started(&execution)
            .await
            .context("Failed to persist new execution")?;

        let shared = Arc::new(Mutex::new(execution));
        self.executions
            .lock()
            .await
            .insert(execution_id, Arc::clone(&shared));
        self.spawn_run(shared, deadline).await;

        Ok(execution_id)
    }

    /// Spawn the background task that drives one execution.
    async fn spawn_run(&self, shared: SharedExecution, deadline: Instant) {
        let (execution_id, product_id) = {
            let execution = shared.lock().await;
            (execution.execution_id, execution.input.product_id.clone())
        };

        // Queue position is taken here, synchronously with the start call,
        // so same-product executions run in start order.
        let (done_tx, done_rx) = watch::channel(false);
        let previous = match self.config.same_product_policy {
            SameProductPolicy::Serialize => self
                .product_queue
                .lock()
                .await
                .insert(product_id.clone(), done_rx.clone()),
            SameProductPolicy::Concurrent => None,
        };

        let engine = Arc::clone(&self.engine);
        let queue = Arc::clone(&self.product_queue);
        let executions = Arc::clone(&self.executions);
        let tasks = Arc::clone(&self.tasks);

        // Held until the handle is stored, so the task cannot remove its
        // entry before it exists.
        let mut task_handles = self.tasks.lock().await;
        let handle = tokio::spawn(async move {
            if let Some(mut previous) = previous {
                info!(
                    execution_id = %execution_id,
                    product_id = %product_id,
                    "Waiting for earlier execution of the same product"
                );
                // A dropped sender means the earlier task is gone
                let _ = previous.wait_for(|done| *done).await;
            }

            match engine.run(&shared, deadline).await {
                Ok(status) => {
                    info!(execution_id = %execution_id, status = %status, "Execution finished");
                    executions.lock().await.remove(&execution_id);
                }
                Err(e) => error!(
                    execution_id = %execution_id,
                    error = %e,
                    "Execution aborted; it stays RUNNING until recovered"
                ),
            }

            let _ = done_tx.send(true);
            {
                let mut queue = queue.lock().await;
                if queue
                    .get(&product_id)
                    .is_some_and(|rx| rx.same_channel(&done_rx))
                {
                    queue.remove(&product_id);
                }
            }
            tasks.lock().await.remove(&execution_id);
        });

        task_handles.insert(execution_id, handle);
    }

    /// Number of executions this process is still driving.
    pub async fn active_executions(&self) -> usize {
        self.executions.lock().await.len()
    }

    /// Get the latest known state of an execution.
    ///
    /// Executions held by this process are answered from memory, others
    /// from the execution store.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution store cannot be read.
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<Option<WorkflowExecution>> {
        let shared = self.executions.lock().await.get(&execution_id).cloned();
        if let Some(shared) = shared {
            let execution = shared.lock().await;
            return Ok(Some(execution.clone()));
        }

        self.recorder
            .store()
            .load(execution_id)
            .await
            .with_context(|| format!("Failed to load execution {execution_id}"))
    }

    /// Summaries of every stored execution, oldest first.
    pub async fn list_executions(&self) -> Result<Vec<ExecutionSummary>> {
        let executions = self
            .recorder
            .store()
            .list()
            .await
            .context("Failed to list executions")?;
        Ok(executions.iter().map(WorkflowExecution::summary).collect())
    }

    /// Wait for the background task of an execution, then return its state.
    ///
    /// Returns at once for executions whose task already ended or that this
    /// process never ran.
    pub async fn wait_for_execution(&self, execution_id: Uuid) -> Result<Option<WorkflowExecution>> {
        let handle = self.tasks.lock().await.remove(&execution_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(execution_id = %execution_id, error = %e, "Execution task panicked");
            }
        }
        self.get_execution(execution_id).await
    }

    /// Wait for every execution task of this process, including tasks
    /// started while waiting.
    pub async fn wait_all(&self) {
        loop {
            let handles: Vec<_> = self.tasks.lock().await.drain().collect();
            if handles.is_empty() {
                return;
            }
            for (execution_id, handle) in handles {
                if let Err(e) = handle.await {
                    error!(execution_id = %execution_id, error = %e, "Execution task panicked");
                }
            }
        }
    }

    /// Resume executions a previous process left `Running`.
    ///
    /// Executions past their deadline are marked `TimedOut`. Others have
    /// their in-flight attempt closed as `Timeout` and continue from the
    /// first state without a successful attempt.
    ///
    /// # Returns
    ///
    /// Ids of the recovered executions, oldest first.
    pub async fn recover(&self) -> Result<Vec<Uuid>> {
        let stored = self
            .recorder
            .store()
            .list()
            .await
            .context("Failed to list executions for recovery")?;

        let mut recovered = Vec::new();
        for candidate in stored {
            if candidate.status != ExecutionStatus::Running {
                continue;
            }
            let execution_id = candidate.execution_id;

            let shared = {
                let mut held = self.executions.lock().await;
                if held.contains_key(&execution_id) {
                    continue;
                }
                // A run of this process may have finished it since the listing
                let execution = match self
                    .recorder
                    .store()
                    .load(execution_id)
                    .await
                    .with_context(|| format!("Failed to load execution {execution_id}"))?
                {
                    Some(execution) if execution.status == ExecutionStatus::Running => execution,
                    _ => continue,
                };
                let shared = Arc::new(Mutex::new(execution));
                held.insert(execution_id, Arc::clone(&shared));
                shared
            };

            let (started_at, pending) = {
                let execution = shared.lock().await;
                (
                    execution.started_at,
                    execution
                        .pending_attempt()
                        .map(|a| (a.step_name, a.attempt_number)),
                )
            };
            let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();
            let remaining = self.config.execution_timeout().saturating_sub(elapsed);

            if remaining.is_zero() {
                info!(execution_id = %execution_id, "Recovered execution is past its deadline");
                self.engine.time_out(&shared).await?;
                self.executions.lock().await.remove(&execution_id);
                recovered.push(execution_id);
                continue;
            }

            if let Some((step, attempt_number)) = pending {
                self.recorder
                    .finish_attempt(
                        &shared,
                        step,
                        attempt_number,
                        AttemptOutcome::Timeout,
                        None,
                        Some("Abandoned: orchestrator restarted".to_string()),
                    )
                    .await?;
            }

            info!(
                execution_id = %execution_id,
                remaining_secs = remaining.as_secs(),
                "Resuming execution"
            );
            self.spawn_run(shared, Instant::now() + remaining).await;
            recovered.push(execution_id);
        }

        Ok(recovered)
    }

    /// Dispatch one protocol operation.
    pub async fn handle_op(&self, op: Op) -> Response {
        match op {
            Op::StartCatalogWorkflow {
                object_key,
                product_id,
                human_model_image_key,
            } => {
                let input = ExecutionInput {
                    object_key,
                    product_id,
                    human_model_image_key,
                };
                started(self.start_catalog_workflow(input).await)
            }
            Op::StartAttributionWorkflow {
                object_key,
                product_id,
            } => started(
                self.start_attribution_workflow(object_key, product_id)
                    .await,
            ),
            Op::GetExecution { execution_id } => match self.get_execution(execution_id).await {
                Ok(Some(execution)) => Response::Execution(Box::new(execution)),
                Ok(None) => Response::NotFound { execution_id },
                Err(e) => Response::Error {
                    message: format!("{e:#}"),
                },
            },
            Op::ListExecutions => match self.list_executions().await {
                Ok(summaries) => Response::Executions(summaries),
                Err(e) => Response::Error {
                    message: format!("{e:#}"),
                },
            },
        }
    }
}

fn started(result: Result<Uuid>) -> Response {
    match result {
        Ok(execution_id) => Response::ExecutionStarted { execution_id },
        Err(e) => Response::Error {
            message: format!("{e:#}"),
        },
    }
}

/// Reject inputs that could never succeed before any execution exists.
fn validate_input(topology: Topology, input: &ExecutionInput) -> Result<()> {
    if input.product_id.trim().is_empty() {
        bail!("productId must not be empty");
    }
    if input.product_id.contains(['/', '\\']) {
        bail!("productId must not contain path separators");
    }
    if !input.object_key.starts_with(INPUT_PREFIX) {
        bail!("objectKey '{}' must be under {INPUT_PREFIX}", input.object_key);
    }
    validate_key(&input.object_key).context("Invalid objectKey")?;

    if let Some(key) = &input.human_model_image_key {
        if topology != Topology::CatalogWorkflow {
            bail!("humanModelImageKey is only accepted by the catalog workflow");
        }
        if key.is_empty() {
            bail!("humanModelImageKey must be omitted rather than empty");
        }
        if !key.starts_with(HUMAN_MODEL_PREFIX) {
            bail!("humanModelImageKey '{key}' must be under {HUMAN_MODEL_PREFIX}");
        }
        validate_key(key).context("Invalid humanModelImageKey")?;
    }
    Ok(())
}
