//! Workflow execution engine.
//!
//! The WorkflowEngine drives one execution through its topology's state
//! machine: it resolves each state's step, invokes it through the
//! [`StepInvoker`], follows the transition table, and closes the execution
//! with exactly one terminal status.

pub mod error;
pub mod invoker;
pub mod retry;

pub use error::WorkflowError;
pub use invoker::{StepInvoker, StepResult};
pub use retry::RetryPolicy;

use crate::state::recorder::{ExecutionRecorder, SharedExecution};
use crate::steps::base::StepContext;
use crate::steps::registry::StepRegistry;
use crate::store::object::{HUMAN_MODEL_PREFIX, OUTPUT_PREFIX};
use crate::workflow::WorkflowDefinitions;
use pc_protocol::config_models::{OrchestratorConfig, StepTimeouts, TimeoutCleanup};
use pc_protocol::workflow_models::ExecutionStatus;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// The main workflow execution engine.
///
/// One engine is shared by every execution; all of its state is immutable.
pub struct WorkflowEngine {
    definitions: Arc<WorkflowDefinitions>,
    registry: StepRegistry,
    context: StepContext,
    recorder: ExecutionRecorder,
    invoker: StepInvoker,
    step_timeouts: StepTimeouts,
    timeout_cleanup: TimeoutCleanup,
}

impl WorkflowEngine {
    /// Create a new WorkflowEngine.
    ///
    /// # Arguments
    ///
    /// * `definitions` - Validated state-machine definitions
    /// * `registry` - Step implementations by name
    /// * `context` - Store capabilities handed to every step
    /// * `recorder` - Persists execution changes and publishes events
    /// * `config` - Timeouts, retry policy and cleanup policy
    pub fn new(
        definitions: Arc<WorkflowDefinitions>,
        registry: StepRegistry,
        context: StepContext,
        recorder: ExecutionRecorder,
        config: &OrchestratorConfig,
    ) -> Self {
        let invoker = StepInvoker::new(
            recorder.clone(),
            context.clone(),
            RetryPolicy::from_config(&config.retry),
        );

        Self {
            definitions,
            registry,
            context,
            recorder,
            invoker,
            step_timeouts: config.step_timeouts.clone(),
            timeout_cleanup: config.timeout_cleanup,
        }
    }

    /// Drive an execution to a terminal status.
    ///
    /// Starts at the first state whose step has not succeeded yet, so the
    /// same method runs fresh executions and resumes recovered ones.
    ///
    /// # Arguments
    ///
    /// * `shared` - The execution, already persisted as `Running`
    /// * `deadline` - Instant at which the execution times out
    ///
    /// # Returns
    ///
    /// The terminal status the execution ended with.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution store fails or the record rejects a
    /// transition. The execution then stays `Running` in the store and is
    /// picked up again by recovery.
    pub async fn run(
        &self,
        shared: &SharedExecution,
        deadline: Instant,
    ) -> Result<ExecutionStatus, WorkflowError> {
        let topology = shared.lock().await.topology;
        let definition = self.definitions.get(topology);

        loop {
            let snapshot = shared.lock().await.clone();
            if snapshot.status.is_terminal() {
                return Ok(snapshot.status);
            }

            let Some(state) = definition.resume_state(&snapshot) else {
                self.recorder.succeed(shared).await?;
                return Ok(ExecutionStatus::Succeeded);
            };

            if Instant::now() >= deadline {
                return self.time_out(shared).await;
            }

            let Some(step) = self.registry.get(state.step) else {
                let error = WorkflowError::StepNotRegistered { step: state.step };
                self.recorder
                    .fail(shared, state.on_exhausted, error.to_string())
                    .await?;
                return Ok(ExecutionStatus::Failed);
            };

            info!(
                execution_id = %snapshot.execution_id,
                state = state.name,
                step = %state.step,
                "Entering state"
            );

            let result = self
                .invoker
                .invoke(
                    shared,
                    step,
                    state.payload_for(&snapshot),
                    self.step_timeouts.for_step(state.step),
                    deadline,
                )
                .await?;

            match result {
                // The next loop iteration picks the following state from history
                StepResult::Succeeded(_) => continue,
                StepResult::Failed(error) => {
                    self.recorder
                        .fail(shared, state.on_exhausted, error.to_string())
                        .await?;
                    return Ok(ExecutionStatus::Failed);
                }
                StepResult::DeadlineExceeded => return self.time_out(shared).await,
            }
        }
    }

    /// Mark the execution `TimedOut` and apply the timeout cleanup policy.
    pub async fn time_out(
        &self,
        shared: &SharedExecution,
    ) -> Result<ExecutionStatus, WorkflowError> {
        self.recorder.time_out(shared).await?;

        if self.timeout_cleanup == TimeoutCleanup::DeleteArtifacts {
            let product_id = shared.lock().await.input.product_id.clone();
            self.delete_artifacts(&product_id).await;
        }
        Ok(ExecutionStatus::TimedOut)
    }

    /// Best-effort removal of the try-on artifacts of a timed-out product.
    async fn delete_artifacts(&self, product_id: &str) {
        let prefixes = [
            format!("{OUTPUT_PREFIX}{product_id}"),
            format!("{HUMAN_MODEL_PREFIX}{product_id}/"),
        ];

        for prefix in prefixes {
            let keys = match self.context.objects.list(&prefix).await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "Failed to list artifacts for cleanup");
                    continue;
                }
            };
            // `output/P1` must not match `output/P10.jpg`
            let owned = keys.into_iter().filter(|key| {
                key.strip_prefix(prefix.as_str()).is_some_and(|rest| {
                    prefix.ends_with('/') || rest.is_empty() || rest.starts_with(['.', '/'])
                })
            });
            for key in owned {
                match self.context.objects.delete(&key).await {
                    Ok(()) => info!(key = %key, "Deleted artifact of timed-out execution"),
                    Err(e) => warn!(key = %key, error = %e, "Failed to delete artifact"),
                }
            }
        }
    }
}
