//! Error taxonomy of workflow execution.

use crate::state::execution::TransitionError;
use crate::steps::base::StepError;
use crate::store::StoreError;
use crate::workflow::DefinitionError;
use pc_protocol::workflow_models::StepName;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while driving a workflow execution.
///
/// The first six variants describe step and execution outcomes and end up
/// as the `error` text of failed executions. The rest are infrastructure
/// errors of the orchestrator itself.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Step-reported error eligible for retry.
    #[error("{step} attempt {attempt} failed: {error}")]
    TransientStepFailure {
        step: StepName,
        attempt: u32,
        error: StepError,
    },

    /// Step-reported error that is never retried.
    #[error("{step} attempt {attempt} failed permanently: {error}")]
    PermanentStepFailure {
        step: StepName,
        attempt: u32,
        error: StepError,
    },

    /// The step did not answer within its own timeout.
    #[error("{step} attempt {attempt} timed out after {timeout:?}")]
    StepTimeout {
        step: StepName,
        attempt: u32,
        timeout: Duration,
    },

    /// An attempt that ended without a step result, such as one cut short
    /// by a restart, as read back from history.
    #[error("{step} attempt {attempt} did not complete: {error}")]
    AbandonedAttempt {
        step: StepName,
        attempt: u32,
        error: String,
    },

    /// The retry budget of a step is used up.
    #[error("{step} exhausted {attempts} attempts; last error: {last}")]
    RetryExhausted {
        step: StepName,
        attempts: u32,
        last: Box<WorkflowError>,
    },

    /// The whole-execution deadline passed.
    #[error("Execution {execution_id} exceeded its deadline")]
    ExecutionTimeout { execution_id: Uuid },

    #[error("No step registered for {step}")]
    StepNotRegistered { step: StepName },

    #[error("Workflow definition is invalid: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Illegal execution transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Execution store failure: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Whether the invoker may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::TransientStepFailure { .. }
                | WorkflowError::StepTimeout { .. }
                | WorkflowError::AbandonedAttempt { .. }
        )
    }
}
