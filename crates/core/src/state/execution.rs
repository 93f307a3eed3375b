//! Execution record state machine.
//!
//! Pure functions over [`WorkflowExecution`]. They enforce the record's
//! invariants (terminal status is final, at most one attempt in flight,
//! attempt numbers start at 1 and increase per step) and never perform I/O;
//! persistence and events are the recorder's job.

use chrono::{DateTime, Utc};
use pc_protocol::workflow_models::{
    AttemptOutcome, ExecutionInput, ExecutionStatus, StepAttempt, StepName, StepOutput,
    TerminalReason, Topology, WorkflowExecution,
};
use thiserror::Error;
use uuid::Uuid;

/// An illegal change to an execution record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Execution {execution_id} is already {status}")]
    AlreadyTerminal {
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[error("Execution {execution_id} already has {step} attempt {attempt_number} in flight")]
    AttemptInFlight {
        execution_id: Uuid,
        step: StepName,
        attempt_number: u32,
    },

    #[error("Execution {execution_id} has no {step} attempt {attempt_number}")]
    UnknownAttempt {
        execution_id: Uuid,
        step: StepName,
        attempt_number: u32,
    },

    #[error("{step} attempt {attempt_number} of execution {execution_id} is already resolved")]
    AttemptAlreadyResolved {
        execution_id: Uuid,
        step: StepName,
        attempt_number: u32,
    },

    #[error("Attempts cannot be resolved as {outcome:?}")]
    InvalidOutcome { outcome: AttemptOutcome },
}

/// Create a new `Running` execution with a fresh id and empty history.
///
/// # Arguments
///
/// * `topology` - The workflow topology to run
/// * `input` - The caller's input
/// * `now` - Start time
pub fn create_execution(
    topology: Topology,
    input: ExecutionInput,
    now: DateTime<Utc>,
) -> WorkflowExecution {
    WorkflowExecution {
        execution_id: Uuid::new_v4(),
        topology,
        input,
        status: ExecutionStatus::Running,
        reason: None,
        error: None,
        history: Vec::new(),
        started_at: now,
        ended_at: None,
    }
}

fn ensure_running(execution: &WorkflowExecution) -> Result<(), TransitionError> {
    if execution.status.is_terminal() {
        return Err(TransitionError::AlreadyTerminal {
            execution_id: execution.execution_id,
            status: execution.status,
        });
    }
    Ok(())
}

/// Append a `Pending` attempt for `step` and return its attempt number.
///
/// # Errors
///
/// Fails if the execution is terminal or another attempt is still pending.
pub fn begin_attempt(
    execution: &mut WorkflowExecution,
    step: StepName,
    now: DateTime<Utc>,
) -> Result<u32, TransitionError> {
    ensure_running(execution)?;
    if let Some(pending) = execution.pending_attempt() {
        return Err(TransitionError::AttemptInFlight {
            execution_id: execution.execution_id,
            step: pending.step_name,
            attempt_number: pending.attempt_number,
        });
    }

    let attempt_number = execution
        .attempts_for(step)
        .map(|a| a.attempt_number)
        .max()
        .unwrap_or(0)
        + 1;

    execution.history.push(StepAttempt {
        step_name: step,
        attempt_number,
        outcome: AttemptOutcome::Pending,
        output: None,
        error: None,
        permanent: false,
        started_at: now,
        ended_at: None,
    });
    Ok(attempt_number)
}

/// Close a pending attempt with a terminal outcome.
///
/// # Errors
///
/// Fails if the execution is terminal, the attempt does not exist, it was
/// already resolved, or `outcome` is `Pending`. Late results from abandoned
/// attempts land here and are refused.
pub fn resolve_attempt(
    execution: &mut WorkflowExecution,
    step: StepName,
    attempt_number: u32,
    outcome: AttemptOutcome,
    output: Option<StepOutput>,
    error: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !outcome.is_terminal() {
        return Err(TransitionError::InvalidOutcome { outcome });
    }
    ensure_running(execution)?;

    let execution_id = execution.execution_id;
    let attempt = execution
        .history
        .iter_mut()
        .find(|a| a.step_name == step && a.attempt_number == attempt_number)
        .ok_or(TransitionError::UnknownAttempt {
            execution_id,
            step,
            attempt_number,
        })?;

    if attempt.outcome.is_terminal() {
        return Err(TransitionError::AttemptAlreadyResolved {
            execution_id,
            step,
            attempt_number,
        });
    }

    attempt.outcome = outcome;
    attempt.output = output;
    attempt.error = error;
    attempt.ended_at = Some(now);
    Ok(())
}

/// Flag a failed attempt as not worth retrying.
///
/// # Errors
///
/// Fails if the attempt does not exist or did not end in `Failure`.
pub fn mark_permanent(
    execution: &mut WorkflowExecution,
    step: StepName,
    attempt_number: u32,
) -> Result<(), TransitionError> {
    let execution_id = execution.execution_id;
    let attempt = execution
        .history
        .iter_mut()
        .find(|a| a.step_name == step && a.attempt_number == attempt_number)
        .ok_or(TransitionError::UnknownAttempt {
            execution_id,
            step,
            attempt_number,
        })?;

    if attempt.outcome != AttemptOutcome::Failure {
        return Err(TransitionError::InvalidOutcome {
            outcome: attempt.outcome,
        });
    }
    attempt.permanent = true;
    Ok(())
}

/// Close any attempt left pending as `Timeout`; its result will be ignored.
fn abandon_pending(execution: &mut WorkflowExecution, reason: &str, now: DateTime<Utc>) {
    for attempt in execution
        .history
        .iter_mut()
        .filter(|a| a.outcome == AttemptOutcome::Pending)
    {
        attempt.outcome = AttemptOutcome::Timeout;
        attempt.error = Some(reason.to_string());
        attempt.ended_at = Some(now);
    }
}

fn finish(
    execution: &mut WorkflowExecution,
    status: ExecutionStatus,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    ensure_running(execution)?;
    abandon_pending(execution, "Abandoned: execution ended", now);
    execution.status = status;
    execution.ended_at = Some(now);
    Ok(())
}

/// Mark the execution `Succeeded`.
pub fn succeed(execution: &mut WorkflowExecution, now: DateTime<Utc>) -> Result<(), TransitionError> {
    finish(execution, ExecutionStatus::Succeeded, now)
}

/// Mark the execution `Failed` with the reason tag of the failing state.
pub fn fail(
    execution: &mut WorkflowExecution,
    reason: TerminalReason,
    error: String,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    finish(execution, ExecutionStatus::Failed, now)?;
    execution.reason = Some(reason);
    execution.error = Some(error);
    Ok(())
}

/// Mark the execution `TimedOut`.
pub fn time_out(execution: &mut WorkflowExecution, now: DateTime<Utc>) -> Result<(), TransitionError> {
    finish(execution, ExecutionStatus::TimedOut, now)?;
    execution.reason = Some(TerminalReason::ExecutionTimeout);
    Ok(())
}
