//! Step invocation wrapper.
//!
//! Runs one state's step to a result: enforces the per-step timeout and the
//! whole-execution deadline, applies the retry policy, and records every
//! attempt through the recorder.

use crate::engine::error::WorkflowError;
use crate::engine::retry::RetryPolicy;
use crate::state::recorder::{ExecutionRecorder, SharedExecution};
use crate::steps::base::{Step, StepContext, StepError, StepPayload, StepRequest};
use pc_protocol::workflow_models::{AttemptOutcome, StepAttempt, StepName, StepOutput};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

/// Final result of invoking one step, retries included.
#[derive(Debug)]
pub enum StepResult {
    Succeeded(StepOutput),
    /// Permanent failure or exhausted retry budget.
    Failed(WorkflowError),
    /// The execution deadline passed while the step was running or backing
    /// off.
    DeadlineExceeded,
}

enum AttemptEnd {
    Finished(Result<StepOutput, StepError>),
    Panicked(String),
    StepTimedOut,
    DeadlineReached,
}

#[derive(Clone)]
pub struct StepInvoker {
    recorder: ExecutionRecorder,
    context: StepContext,
    retry: RetryPolicy,
}

impl StepInvoker {
    pub fn new(recorder: ExecutionRecorder, context: StepContext, retry: RetryPolicy) -> Self {
        Self {
            recorder,
            context,
            retry,
        }
    }

    /// Invoke `step` until it succeeds, fails permanently, runs out of
    /// attempts, or the deadline passes.
    ///
    /// # Arguments
    ///
    /// * `shared` - The execution the attempts are recorded on
    /// * `step` - The step implementation
    /// * `payload` - Step input, identical for every attempt
    /// * `step_timeout` - Per-attempt timeout
    /// * `deadline` - Whole-execution deadline
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError` only for orchestrator failures (store or
    /// illegal transition). Step failures are reported as `StepResult`.
    pub async fn invoke(
        &self,
        shared: &SharedExecution,
        step: Arc<dyn Step>,
        payload: StepPayload,
        step_timeout: Duration,
        deadline: Instant,
    ) -> Result<StepResult, WorkflowError> {
        let name = step.name();
        let execution_id = shared.lock().await.execution_id;

        if let Some(error) = self.settled_by_history(shared, name).await {
            warn!(
                execution_id = %execution_id,
                step = %name,
                error = %error,
                "Recorded attempts leave no retry"
            );
            return Ok(StepResult::Failed(error));
        }

        loop {
            if Instant::now() >= deadline {
                return Ok(StepResult::DeadlineExceeded);
            }

            let attempt = self.recorder.begin_attempt(shared, name).await?;
            let request = StepRequest {
                execution_id,
                attempt_number: attempt,
                payload: payload.clone(),
            };

            let task_step = Arc::clone(&step);
            let context = self.context.clone();
            let mut handle =
                tokio::spawn(async move { task_step.invoke(&context, request).await });

            let end = tokio::select! {
                biased;
                joined = &mut handle => match joined {
                    Ok(result) => AttemptEnd::Finished(result),
                    Err(e) => AttemptEnd::Panicked(e.to_string()),
                },
                _ = sleep_until(deadline) => AttemptEnd::DeadlineReached,
                _ = sleep(step_timeout) => AttemptEnd::StepTimedOut,
            };

            let error = match end {
                AttemptEnd::Finished(Ok(output)) => {
                    self.recorder
                        .finish_attempt(
                            shared,
                            name,
                            attempt,
                            AttemptOutcome::Success,
                            Some(output.clone()),
                            None,
                        )
                        .await?;
                    return Ok(StepResult::Succeeded(output));
                }
                AttemptEnd::Finished(Err(error)) if self.retry.is_permanent(&error) => {
                    self.recorder
                        .finish_permanent_failure(shared, name, attempt, error.to_string())
                        .await?;
                    return Ok(StepResult::Failed(WorkflowError::PermanentStepFailure {
                        step: name,
                        attempt,
                        error,
                    }));
                }
                AttemptEnd::Finished(Err(error)) => {
                    self.recorder
                        .finish_attempt(
                            shared,
                            name,
                            attempt,
                            AttemptOutcome::Failure,
                            None,
                            Some(error.to_string()),
                        )
                        .await?;
                    WorkflowError::TransientStepFailure {
                        step: name,
                        attempt,
                        error,
                    }
                }
                AttemptEnd::Panicked(message) => {
                    let error = StepError::transient("StepPanicked", message);
                    self.recorder
                        .finish_attempt(
                            shared,
                            name,
                            attempt,
                            AttemptOutcome::Failure,
                            None,
                            Some(error.to_string()),
                        )
                        .await?;
                    WorkflowError::TransientStepFailure {
                        step: name,
                        attempt,
                        error,
                    }
                }
                AttemptEnd::StepTimedOut => {
                    let error = WorkflowError::StepTimeout {
                        step: name,
                        attempt,
                        timeout: step_timeout,
                    };
                    self.recorder
                        .finish_attempt(
                            shared,
                            name,
                            attempt,
                            AttemptOutcome::Timeout,
                            None,
                            Some(error.to_string()),
                        )
                        .await?;
                    self.watch_late_result(shared, name, attempt, handle);
                    error
                }
                AttemptEnd::DeadlineReached => {
                    let error = WorkflowError::ExecutionTimeout { execution_id };
                    self.recorder
                        .finish_attempt(
                            shared,
                            name,
                            attempt,
                            AttemptOutcome::Timeout,
                            None,
                            Some(error.to_string()),
                        )
                        .await?;
                    self.watch_late_result(shared, name, attempt, handle);
                    return Ok(StepResult::DeadlineExceeded);
                }
            };

            if !self.retry.allows_retry_after(attempt) {
                return Ok(StepResult::Failed(WorkflowError::RetryExhausted {
                    step: name,
                    attempts: attempt,
                    last: Box::new(error),
                }));
            }

            let backoff = self.retry.backoff_after(attempt);
            debug!(
                execution_id = %execution_id,
                step = %name,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying step"
            );

            tokio::select! {
                biased;
                _ = sleep_until(deadline) => return Ok(StepResult::DeadlineExceeded),
                _ = sleep(backoff) => {}
            }
        }
    }

    /// Failure already decided by attempts recorded earlier, typically by a
    /// process that stopped before closing the execution.
    ///
    /// A permanent failure is final, and attempts abandoned by a restart
    /// count toward the budget like any other.
    async fn settled_by_history(
        &self,
        shared: &SharedExecution,
        step: StepName,
    ) -> Option<WorkflowError> {
        let execution = shared.lock().await;
        let last = execution
            .attempts_for(step)
            .filter(|a| a.outcome.is_terminal())
            .max_by_key(|a| a.attempt_number)?;
        let error = recorded_error(last);

        if last.permanent {
            return Some(error);
        }
        if self.retry.allows_retry_after(last.attempt_number) {
            return None;
        }
        Some(WorkflowError::RetryExhausted {
            step,
            attempts: last.attempt_number,
            last: Box::new(error),
        })
    }

    /// Keep listening to an abandoned attempt so that a late result is
    /// routed to the recorder, which discards it.
    fn watch_late_result(
        &self,
        shared: &SharedExecution,
        step: StepName,
        attempt: u32,
        handle: JoinHandle<Result<StepOutput, StepError>>,
    ) {
        let recorder = self.recorder.clone();
        let shared = Arc::clone(shared);

        tokio::spawn(async move {
            let Ok(result) = handle.await else {
                return;
            };
            let (outcome, output, error) = match result {
                Ok(output) => (AttemptOutcome::Success, Some(output), None),
                Err(e) => (AttemptOutcome::Failure, None, Some(e.to_string())),
            };
            if let Err(e) = recorder
                .finish_attempt(&shared, step, attempt, outcome, output, error)
                .await
            {
                warn!(step = %step, attempt, error = %e, "Failed to route late step result");
            }
        });
    }
}

/// Rebuild the error of a finished attempt from its history entry.
fn recorded_error(attempt: &StepAttempt) -> WorkflowError {
    let step = attempt.step_name;
    let text = attempt.error.clone().unwrap_or_default();

    if attempt.outcome != AttemptOutcome::Failure {
        return WorkflowError::AbandonedAttempt {
            step,
            attempt: attempt.attempt_number,
            error: text,
        };
    }

    // Step errors are recorded as "{code}: {message}"
    let (code, message) = text.split_once(": ").unwrap_or(("Unknown", text.as_str()));
    if attempt.permanent {
        WorkflowError::PermanentStepFailure {
            step,
            attempt: attempt.attempt_number,
            error: StepError::permanent(code, message),
        }
    } else {
        WorkflowError::TransientStepFailure {
            step,
            attempt: attempt.attempt_number,
            error: StepError::transient(code, message),
        }
    }
}
