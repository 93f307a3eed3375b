//! End-to-end tests running the built-in steps over real stores.
//!
//! These tests verify the complete flow:
//! 1. A workflow is started with an uploaded image
//! 2. The built-in steps read the object store and merge into the draft
//! 3. The execution record and events reflect every attempt
//! 4. The draft ends in the expected stage

mod common;

use common::*;
use pc_core::config::ProjectLayout;
use pc_protocol::ipc::{Event, Op, Response};
use pc_protocol::product_models::{DraftStatus, ImageRole};
use pc_protocol::workflow_models::{
    AttemptOutcome, ExecutionInput, ExecutionStatus, StepName, TerminalReason,
};
use tempfile::tempdir;
use uuid::Uuid;

#[tokio::test]
async fn test_catalog_happy_path() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;

    let id = harness
        .manager
        .start_catalog_workflow(ExecutionInput::new("input/shirt1.jpg", "P100"))
        .await
        .unwrap();
    let execution = harness.manager.wait_for_execution(id).await.unwrap().unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(execution.reason, None);
    for step in [
        StepName::DetectLabels,
        StepName::ProductAttribution,
        StepName::TryOnGeneration,
    ] {
        assert_eq!(outcomes(&execution, step), vec![AttemptOutcome::Success]);
    }
    assert_execution_invariants(&execution);

    assert!(harness.objects.exists("output/P100.jpg").await.unwrap());
    assert!(harness
        .objects
        .exists("human-model-images/P100/1.png")
        .await
        .unwrap());

    let draft = harness.records.get("P100").await.unwrap().unwrap();
    assert_eq!(draft.status, DraftStatus::Complete);
    assert_eq!(draft.status.as_str(), "complete");
    assert_eq!(draft.progress, 100);
    assert_eq!(draft.execution_id, Some(id));
    assert_eq!(draft.attributes.get("rootCategory"), Some(&"Shirt".to_string()));
    assert_eq!(draft.attributes.get("title"), Some(&"Classic Shirt".to_string()));
    assert_eq!(
        draft.image_refs.get(&ImageRole::Input),
        Some(&"input/shirt1.jpg".to_string())
    );
    assert_eq!(
        draft.image_refs.get(&ImageRole::TryOn),
        Some(&"output/P100.jpg".to_string())
    );
}

#[tokio::test]
async fn test_catalog_uses_given_human_model_image() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;
    harness
        .objects
        .put("human-model-images/studio/1.png", vec![7; 16])
        .await
        .unwrap();

    let id = harness
        .manager
        .start_catalog_workflow(
            ExecutionInput::new("input/shirt1.jpg", "P100")
                .with_human_model("human-model-images/studio/1.png"),
        )
        .await
        .unwrap();
    let execution = harness.manager.wait_for_execution(id).await.unwrap().unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    let draft = harness.records.get("P100").await.unwrap().unwrap();
    assert_eq!(
        draft.image_refs.get(&ImageRole::HumanModel),
        Some(&"human-model-images/studio/1.png".to_string())
    );
    assert!(!harness
        .objects
        .exists("human-model-images/P100/1.png")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_attribution_workflow_completes_draft_without_images() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;

    let id = harness
        .manager
        .start_attribution_workflow("input/shirt1.jpg".to_string(), "P200".to_string())
        .await
        .unwrap();
    let execution = harness.manager.wait_for_execution(id).await.unwrap().unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        outcomes(&execution, StepName::GenericAttribution),
        vec![AttemptOutcome::Success]
    );
    assert!(execution.attempts_for(StepName::DetectLabels).next().is_none());

    let draft = harness.records.get("P200").await.unwrap().unwrap();
    assert_eq!(draft.status, DraftStatus::Complete);
    assert!(draft.attributes.contains_key("title"));
    assert!(harness.objects.list("output/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_input_image_fails_without_retry() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;

    let id = harness
        .manager
        .start_catalog_workflow(ExecutionInput::new("input/missing.jpg", "P300"))
        .await
        .unwrap();
    let execution = harness.manager.wait_for_execution(id).await.unwrap().unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.reason, Some(TerminalReason::LabelDetectionExhausted));
    assert_eq!(
        outcomes(&execution, StepName::DetectLabels),
        vec![AttemptOutcome::Failure]
    );
    assert!(harness.records.get("P300").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unsupported_image_type_fails_attribution_workflow() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;
    harness
        .objects
        .put("input/shirt1.gif", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();

    let id = harness
        .manager
        .start_attribution_workflow("input/shirt1.gif".to_string(), "P301".to_string())
        .await
        .unwrap();
    let execution = harness.manager.wait_for_execution(id).await.unwrap().unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.reason,
        Some(TerminalReason::GenericAttributionExhausted)
    );
    assert_eq!(execution.history.len(), 1);
}

#[tokio::test]
async fn test_invalid_start_creates_no_execution() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;

    assert!(harness
        .manager
        .start_catalog_workflow(ExecutionInput::new("input/shirt1.jpg", ""))
        .await
        .is_err());
    assert!(harness
        .manager
        .start_attribution_workflow("output/P1.jpg".to_string(), "P1".to_string())
        .await
        .is_err());
    assert!(harness
        .manager
        .start_catalog_workflow(ExecutionInput::new("input/shirt1.jpg", "P1").with_human_model(""))
        .await
        .is_err());

    assert!(harness.manager.list_executions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeating_a_workflow_leaves_the_same_draft() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;
    let input = ExecutionInput::new("input/shirt1.jpg", "P100");

    let first = harness
        .manager
        .start_catalog_workflow(input.clone())
        .await
        .unwrap();
    harness.manager.wait_for_execution(first).await.unwrap();
    let after_first = harness.records.get("P100").await.unwrap().unwrap();

    let second = harness.manager.start_catalog_workflow(input).await.unwrap();
    harness.manager.wait_for_execution(second).await.unwrap();
    let after_second = harness.records.get("P100").await.unwrap().unwrap();

    assert_eq!(after_first.attributes, after_second.attributes);
    assert_eq!(after_first.image_refs, after_second.image_refs);
    assert_eq!(after_first.status, after_second.status);
    assert_eq!(after_first.progress, after_second.progress);
    assert_eq!(after_second.execution_id, Some(second));
    assert_eq!(
        harness.objects.list("output/").await.unwrap(),
        vec!["output/P100.jpg"]
    );
}

#[tokio::test]
async fn test_event_sequence_of_successful_execution() {
    let mut harness = in_memory_harness(fast_config(), builtin_registry()).await;

    let id = harness
        .manager
        .start_attribution_workflow("input/shirt1.jpg".to_string(), "P400".to_string())
        .await
        .unwrap();
    harness.manager.wait_for_execution(id).await.unwrap();

    let events = events_for(&drain_events(&mut harness.events), id);
    assert!(matches!(events[0], Event::ExecutionStarted { .. }));
    assert!(matches!(
        events[1],
        Event::ExecutionStatusUpdate {
            status: ExecutionStatus::Running,
            ..
        }
    ));
    assert!(events.contains(&Event::StepAttemptStarted {
        execution_id: id,
        step: StepName::GenericAttribution,
        attempt_number: 1,
    }));
    assert!(events.contains(&Event::StepAttemptFinished {
        execution_id: id,
        step: StepName::GenericAttribution,
        attempt_number: 1,
        outcome: AttemptOutcome::Success,
    }));
    assert_eq!(events.last(), Some(&Event::ExecutionSucceeded { execution_id: id }));
    assert_terminal_event_is_last(&events);
}

#[tokio::test]
async fn test_handle_op_round_trip() {
    let harness = in_memory_harness(fast_config(), builtin_registry()).await;

    let started = harness
        .manager
        .handle_op(Op::StartAttributionWorkflow {
            object_key: "input/shirt1.jpg".to_string(),
            product_id: "P500".to_string(),
        })
        .await;
    let Response::ExecutionStarted { execution_id } = started else {
        panic!("expected ExecutionStarted, got {started:?}");
    };
    harness.manager.wait_for_execution(execution_id).await.unwrap();

    match harness.manager.handle_op(Op::GetExecution { execution_id }).await {
        Response::Execution(execution) => {
            assert_eq!(execution.status, ExecutionStatus::Succeeded)
        }
        other => panic!("expected Execution, got {other:?}"),
    }

    match harness.manager.handle_op(Op::ListExecutions).await {
        Response::Executions(summaries) => {
            assert_eq!(summaries.len(), 1);
            assert_eq!(summaries[0].product_id, "P500");
        }
        other => panic!("expected Executions, got {other:?}"),
    }

    let unknown = Uuid::new_v4();
    assert!(matches!(
        harness.manager.handle_op(Op::GetExecution { execution_id: unknown }).await,
        Response::NotFound { execution_id } if execution_id == unknown
    ));

    assert!(matches!(
        harness
            .manager
            .handle_op(Op::StartCatalogWorkflow {
                object_key: "input/shirt1.jpg".to_string(),
                product_id: String::new(),
                human_model_image_key: None,
            })
            .await,
        Response::Error { .. }
    ));
}

#[tokio::test]
async fn test_catalog_on_filesystem_stores() {
    let dir = tempdir().expect("Failed to create temp dir");
    let harness = fs_harness(dir.path(), fast_config(), builtin_registry());
    harness
        .objects
        .put("input/shirt1.jpg", SHIRT_IMAGE.to_vec())
        .await
        .unwrap();

    let id = harness
        .manager
        .start_catalog_workflow(ExecutionInput::new("input/shirt1.jpg", "P100"))
        .await
        .unwrap();
    let execution = harness.manager.wait_for_execution(id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Succeeded);

    let layout = ProjectLayout::new(dir.path());
    assert!(layout.objects_dir().join("output/P100.jpg").is_file());
    assert!(layout.records_dir().join("P100.json").is_file());
    assert!(layout.executions_dir().join(format!("{id}.json")).is_file());

    let stored = harness.executions.load(id).await.unwrap().unwrap();
    assert_eq!(stored, execution);
}
