//! Recovery tests: a new process picks up executions left `Running` on disk.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use pc_core::state::execution::{
    begin_attempt, create_execution, mark_permanent, resolve_attempt, succeed,
};
use pc_protocol::workflow_models::{
    AttemptOutcome, ExecutionInput, ExecutionStatus, StepName, TerminalReason, Topology,
    WorkflowExecution,
};
use tempfile::tempdir;

/// A catalog execution whose process died while attribution was running.
fn interrupted_during_attribution(started_ago: ChronoDuration) -> WorkflowExecution {
    let started = Utc::now() - started_ago;
    let mut execution = create_execution(
        Topology::CatalogWorkflow,
        ExecutionInput::new("input/shirt1.jpg", "P100"),
        started,
    );
    let n = begin_attempt(&mut execution, StepName::DetectLabels, started).unwrap();
    resolve_attempt(
        &mut execution,
        StepName::DetectLabels,
        n,
        AttemptOutcome::Success,
        Some(shirt_labels()),
        None,
        started,
    )
    .unwrap();
    begin_attempt(&mut execution, StepName::ProductAttribution, started).unwrap();
    execution
}

/// An attribution execution with `failed` transient failures recorded for
/// GenericAttribution.
fn attribution_with_failures(failed: u32) -> WorkflowExecution {
    let started = Utc::now() - ChronoDuration::seconds(5);
    let mut execution = create_execution(
        Topology::AttributionWorkflow,
        ExecutionInput::new("input/shirt1.jpg", "P5"),
        started,
    );
    for _ in 0..failed {
        let n = begin_attempt(&mut execution, StepName::GenericAttribution, started).unwrap();
        resolve_attempt(
            &mut execution,
            StepName::GenericAttribution,
            n,
            AttemptOutcome::Failure,
            None,
            Some("Throttling: slow down".to_string()),
            started,
        )
        .unwrap();
    }
    execution
}

#[tokio::test]
async fn test_recover_resumes_at_first_unfinished_state() {
    let dir = tempdir().expect("Failed to create temp dir");
    let harness = fs_harness(dir.path(), fast_config(), builtin_registry());
    harness
        .objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();
    let interrupted = interrupted_during_attribution(ChronoDuration::seconds(5));
    harness.executions.save(&interrupted).await.unwrap();

    let recovered = harness.manager.recover().await.unwrap();
    assert_eq!(recovered, vec![interrupted.execution_id]);

    let execution = harness
        .manager
        .wait_for_execution(interrupted.execution_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        outcomes(&execution, StepName::DetectLabels),
        vec![AttemptOutcome::Success]
    );
    assert_eq!(
        outcomes(&execution, StepName::ProductAttribution),
        vec![AttemptOutcome::Timeout, AttemptOutcome::Success]
    );
    assert_eq!(
        outcomes(&execution, StepName::TryOnGeneration),
        vec![AttemptOutcome::Success]
    );
    let abandoned = execution
        .attempts_for(StepName::ProductAttribution)
        .next()
        .unwrap();
    assert!(abandoned.error.as_deref().unwrap().contains("restarted"));
    assert_execution_invariants(&execution);

    // Labels came from the recorded DetectLabels output
    let draft = harness.records.get("P100").await.unwrap().unwrap();
    assert_eq!(draft.attributes.get("rootCategory"), Some(&"Shirt".to_string()));
    assert_eq!(
        draft.attributes.get("parentCategories"),
        Some(&"Apparel > Clothing > Shirt".to_string())
    );
}

#[tokio::test]
async fn test_recover_times_out_executions_past_their_deadline() {
    let dir = tempdir().expect("Failed to create temp dir");
    let harness = fs_harness(dir.path(), fast_config(), builtin_registry());
    let interrupted = interrupted_during_attribution(ChronoDuration::minutes(20));
    harness.executions.save(&interrupted).await.unwrap();

    let recovered = harness.manager.recover().await.unwrap();
    assert_eq!(recovered, vec![interrupted.execution_id]);

    let execution = harness
        .executions
        .load(interrupted.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::TimedOut);
    assert_eq!(execution.reason, Some(TerminalReason::ExecutionTimeout));
    assert!(execution.pending_attempt().is_none());
    assert_execution_invariants(&execution);
}

#[tokio::test]
async fn test_recover_skips_terminal_and_already_held_executions() {
    let dir = tempdir().expect("Failed to create temp dir");
    let harness = fs_harness(dir.path(), fast_config(), builtin_registry());
    harness
        .objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();

    let mut finished = create_execution(
        Topology::AttributionWorkflow,
        ExecutionInput::new("input/shirt1.jpg", "P1"),
        Utc::now(),
    );
    succeed(&mut finished, Utc::now()).unwrap();
    harness.executions.save(&finished).await.unwrap();

    let interrupted = interrupted_during_attribution(ChronoDuration::seconds(1));
    harness.executions.save(&interrupted).await.unwrap();

    assert_eq!(
        harness.manager.recover().await.unwrap(),
        vec![interrupted.execution_id]
    );
    // A second pass finds nothing new to resume
    assert!(harness.manager.recover().await.unwrap().is_empty());

    harness.manager.wait_all().await;
    let stored = harness.executions.load(finished.execution_id).await.unwrap().unwrap();
    assert_eq!(stored, finished);
}

#[tokio::test]
async fn test_new_process_reads_executions_from_disk() {
    let dir = tempdir().expect("Failed to create temp dir");
    let first = fs_harness(dir.path(), fast_config(), builtin_registry());
    first
        .objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();
    let id = first
        .manager
        .start_attribution_workflow("input/shirt1.jpg".to_string(), "P9".to_string())
        .await
        .unwrap();
    let finished = first.manager.wait_for_execution(id).await.unwrap().unwrap();
    drop(first);

    let second = fs_harness(dir.path(), fast_config(), builtin_registry());
    let loaded = second.manager.get_execution(id).await.unwrap().unwrap();
    assert_eq!(loaded, finished);

    let listed = second.manager.list_executions().await.unwrap();
    assert_eq!(listed, vec![finished.summary()]);
    assert!(second.manager.recover().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recover_counts_the_interrupted_attempt_toward_the_budget() {
    let dir = tempdir().expect("Failed to create temp dir");
    let harness = fs_harness(dir.path(), fast_config(), builtin_registry());
    harness
        .objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();

    // The last allowed attempt was in flight when the process died
    let mut interrupted = attribution_with_failures(2);
    begin_attempt(&mut interrupted, StepName::GenericAttribution, Utc::now()).unwrap();
    harness.executions.save(&interrupted).await.unwrap();

    harness.manager.recover().await.unwrap();
    let execution = harness
        .manager
        .wait_for_execution(interrupted.execution_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.reason,
        Some(TerminalReason::GenericAttributionExhausted)
    );
    assert_eq!(
        outcomes(&execution, StepName::GenericAttribution),
        vec![
            AttemptOutcome::Failure,
            AttemptOutcome::Failure,
            AttemptOutcome::Timeout
        ]
    );
    assert!(execution
        .error
        .as_deref()
        .unwrap()
        .contains("exhausted 3 attempts"));
    assert!(harness.records.get("P5").await.unwrap().is_none());
    assert_execution_invariants(&execution);
}

#[tokio::test]
async fn test_recover_resumes_within_the_budget() {
    let dir = tempdir().expect("Failed to create temp dir");
    let harness = fs_harness(dir.path(), fast_config(), builtin_registry());
    harness
        .objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();

    let mut interrupted = attribution_with_failures(1);
    begin_attempt(&mut interrupted, StepName::GenericAttribution, Utc::now()).unwrap();
    harness.executions.save(&interrupted).await.unwrap();

    harness.manager.recover().await.unwrap();
    let execution = harness
        .manager
        .wait_for_execution(interrupted.execution_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        outcomes(&execution, StepName::GenericAttribution),
        vec![
            AttemptOutcome::Failure,
            AttemptOutcome::Timeout,
            AttemptOutcome::Success
        ]
    );
    assert_execution_invariants(&execution);
}

#[tokio::test]
async fn test_recover_does_not_retry_a_recorded_permanent_failure() {
    let dir = tempdir().expect("Failed to create temp dir");
    let harness = fs_harness(dir.path(), fast_config(), builtin_registry());
    harness
        .objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();

    // The failure was recorded but the process died before closing the execution
    let mut interrupted = create_execution(
        Topology::AttributionWorkflow,
        ExecutionInput::new("input/shirt1.jpg", "P5"),
        Utc::now(),
    );
    let n = begin_attempt(&mut interrupted, StepName::GenericAttribution, Utc::now()).unwrap();
    resolve_attempt(
        &mut interrupted,
        StepName::GenericAttribution,
        n,
        AttemptOutcome::Failure,
        None,
        Some("ValidationException: unsupported image".to_string()),
        Utc::now(),
    )
    .unwrap();
    mark_permanent(&mut interrupted, StepName::GenericAttribution, n).unwrap();
    harness.executions.save(&interrupted).await.unwrap();

    assert_eq!(
        harness.manager.recover().await.unwrap(),
        vec![interrupted.execution_id]
    );
    let execution = harness
        .manager
        .wait_for_execution(interrupted.execution_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.reason,
        Some(TerminalReason::GenericAttributionExhausted)
    );
    assert_eq!(
        outcomes(&execution, StepName::GenericAttribution),
        vec![AttemptOutcome::Failure]
    );
    assert!(execution
        .error
        .as_deref()
        .unwrap()
        .contains("ValidationException: unsupported image"));
    assert!(harness.records.get("P5").await.unwrap().is_none());
    assert_execution_invariants(&execution);
}
