//! Execution recorder: applies transitions, persists them, publishes events.
//!
//! Every change to an execution record goes through here. A change is
//! applied to a copy, saved to the execution store, and only then swapped
//! into the shared record and announced on the event channel.

use crate::engine::error::WorkflowError;
use crate::state::execution::{self, TransitionError};
use crate::store::ExecutionStore;
use chrono::Utc;
use pc_protocol::ipc::Event;
use pc_protocol::workflow_models::{
    AttemptOutcome, ExecutionStatus, StepName, StepOutput, TerminalReason, WorkflowExecution,
};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// An execution record shared between the engine, late-result watchers and
/// readers.
pub type SharedExecution = Arc<Mutex<WorkflowExecution>>;

#[derive(Clone)]
pub struct ExecutionRecorder {
    store: Arc<dyn ExecutionStore>,
    events_tx: broadcast::Sender<Event>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn ExecutionStore>, events_tx: broadcast::Sender<Event>) -> Self {
        Self { store, events_tx }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    /// Apply `transition` to a copy of the record, persist the copy, then
    /// publish it to the shared record.
    async fn apply<T>(
        &self,
        shared: &SharedExecution,
        transition: impl FnOnce(&mut WorkflowExecution) -> Result<T, TransitionError>,
    ) -> Result<(T, WorkflowExecution), WorkflowError> {
        let mut guard = shared.lock().await;
        let mut next = guard.clone();
        let value = transition(&mut next)?;
        self.store.save(&next).await?;
        *guard = next.clone();
        Ok((value, next))
    }

    /// Persist a freshly created execution and announce it.
    pub async fn record_started(&self, execution: &WorkflowExecution) -> Result<(), WorkflowError> {
        self.store.save(execution).await?;

        info!(
            execution_id = %execution.execution_id,
            topology = %execution.topology,
            product_id = %execution.input.product_id,
            "Execution started"
        );
        self.emit(Event::ExecutionStarted {
            execution_id: execution.execution_id,
            topology: execution.topology,
            product_id: execution.input.product_id.clone(),
        });
        self.emit(Event::ExecutionStatusUpdate {
            execution_id: execution.execution_id,
            status: ExecutionStatus::Running,
        });
        Ok(())
    }

    /// Append a pending attempt for `step` and return its number.
    pub async fn begin_attempt(
        &self,
        shared: &SharedExecution,
        step: StepName,
    ) -> Result<u32, WorkflowError> {
        let (attempt_number, execution) = self
            .apply(shared, |e| execution::begin_attempt(e, step, Utc::now()))
            .await?;

        debug!(
            execution_id = %execution.execution_id,
            step = %step,
            attempt = attempt_number,
            "Step attempt started"
        );
        self.emit(Event::StepAttemptStarted {
            execution_id: execution.execution_id,
            step,
            attempt_number,
        });
        Ok(attempt_number)
    }

    /// Record the outcome of an attempt.
    ///
    /// Returns `Ok(false)` when the attempt or the execution was already
    /// closed: the result is late and is discarded without touching the
    /// record.
    pub async fn finish_attempt(
        &self,
        shared: &SharedExecution,
        step: StepName,
        attempt_number: u32,
        outcome: AttemptOutcome,
        output: Option<StepOutput>,
        error: Option<String>,
    ) -> Result<bool, WorkflowError> {
        self.resolve(shared, step, attempt_number, outcome, |e| {
            execution::resolve_attempt(
                e,
                step,
                attempt_number,
                outcome,
                output,
                error,
                Utc::now(),
            )
        })
        .await
    }

    /// Record a `Failure` that must not be retried, in the same write as the
    /// outcome so a restart cannot lose the classification.
    pub async fn finish_permanent_failure(
        &self,
        shared: &SharedExecution,
        step: StepName,
        attempt_number: u32,
        error: String,
    ) -> Result<bool, WorkflowError> {
        let outcome = AttemptOutcome::Failure;
        self.resolve(shared, step, attempt_number, outcome, |e| {
            execution::resolve_attempt(
                e,
                step,
                attempt_number,
                outcome,
                None,
                Some(error),
                Utc::now(),
            )?;
            execution::mark_permanent(e, step, attempt_number)
        })
        .await
    }

    async fn resolve(
        &self,
        shared: &SharedExecution,
        step: StepName,
        attempt_number: u32,
        outcome: AttemptOutcome,
        transition: impl FnOnce(&mut WorkflowExecution) -> Result<(), TransitionError>,
    ) -> Result<bool, WorkflowError> {
        let result = self.apply(shared, transition).await;

        match result {
            Ok(((), execution)) => {
                debug!(
                    execution_id = %execution.execution_id,
                    step = %step,
                    attempt = attempt_number,
                    outcome = ?outcome,
                    "Step attempt finished"
                );
                self.emit(Event::StepAttemptFinished {
                    execution_id: execution.execution_id,
                    step,
                    attempt_number,
                    outcome,
                });
                Ok(true)
            }
            Err(WorkflowError::Transition(
                TransitionError::AlreadyTerminal { execution_id, .. }
                | TransitionError::AttemptAlreadyResolved { execution_id, .. },
            )) => {
                info!(
                    execution_id = %execution_id,
                    step = %step,
                    attempt = attempt_number,
                    "Discarding late step result"
                );
                self.emit(Event::LateResultDiscarded {
                    execution_id,
                    step,
                    attempt_number,
                });
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn succeed(&self, shared: &SharedExecution) -> Result<(), WorkflowError> {
        let ((), execution) = self
            .apply(shared, |e| execution::succeed(e, Utc::now()))
            .await?;

        info!(execution_id = %execution.execution_id, "Execution succeeded");
        self.emit(Event::ExecutionStatusUpdate {
            execution_id: execution.execution_id,
            status: execution.status,
        });
        self.emit(Event::ExecutionSucceeded {
            execution_id: execution.execution_id,
        });
        Ok(())
    }

    pub async fn fail(
        &self,
        shared: &SharedExecution,
        reason: TerminalReason,
        error: String,
    ) -> Result<(), WorkflowError> {
        let message = error.clone();
        let ((), execution) = self
            .apply(shared, |e| execution::fail(e, reason, error, Utc::now()))
            .await?;

        warn!(
            execution_id = %execution.execution_id,
            reason = %reason,
            error = %message,
            "Execution failed"
        );
        self.emit(Event::ExecutionStatusUpdate {
            execution_id: execution.execution_id,
            status: execution.status,
        });
        self.emit(Event::ExecutionFailed {
            execution_id: execution.execution_id,
            reason,
            error: message,
        });
        Ok(())
    }

    pub async fn time_out(&self, shared: &SharedExecution) -> Result<(), WorkflowError> {
        let ((), execution) = self
            .apply(shared, |e| execution::time_out(e, Utc::now()))
            .await?;

        warn!(execution_id = %execution.execution_id, "Execution timed out");
        self.emit(Event::ExecutionStatusUpdate {
            execution_id: execution.execution_id,
            status: execution.status,
        });
        self.emit(Event::ExecutionTimedOut {
            execution_id: execution.execution_id,
        });
        Ok(())
    }
}
