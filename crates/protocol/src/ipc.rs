//! Request/notification protocol of the orchestrator.
//!
//! The protocol follows an Operation/Event pattern:
//! - `Op`: requests sent by a front-end (CLI, UI) to the core
//! - `Response`: the direct answer to one `Op`
//! - `Event`: asynchronous notifications published while executions run
//!
//! Events are a convenience for front-ends; the execution record returned by
//! `GetExecution` is always the source of truth.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::workflow_models::{
    AttemptOutcome, ExecutionStatus, ExecutionSummary, StepName, TerminalReason, Topology,
    WorkflowExecution,
};

/// Operations sent from a front-end to the core.
///
/// Uses tagged enum serialization:
/// ```json
/// {
///   "type": "startCatalogWorkflow",
///   "payload": {
///     "objectKey": "input/shirt1.jpg",
///     "productId": "P100"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Op {
    /// Start the detect-labels / attribution / try-on pipeline.
    #[serde(rename_all = "camelCase")]
    StartCatalogWorkflow {
        object_key: String,
        product_id: String,
        #[serde(default)]
        human_model_image_key: Option<String>,
    },

    /// Start the attribution-only pipeline.
    #[serde(rename_all = "camelCase")]
    StartAttributionWorkflow {
        object_key: String,
        product_id: String,
    },

    /// Read the latest known state of one execution.
    #[serde(rename_all = "camelCase")]
    GetExecution {
        #[ts(type = "string")]
        execution_id: Uuid,
    },

    /// List every known execution.
    ListExecutions,
}

/// Direct answers to an [`Op`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        #[ts(type = "string")]
        execution_id: Uuid,
    },

    Execution(Box<WorkflowExecution>),

    Executions(Vec<ExecutionSummary>),

    #[serde(rename_all = "camelCase")]
    NotFound {
        #[ts(type = "string")]
        execution_id: Uuid,
    },

    Error { message: String },
}

/// Notifications published by the core while executions progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        #[ts(type = "string")]
        execution_id: Uuid,
        topology: Topology,
        product_id: String,
    },

    #[serde(rename_all = "camelCase")]
    ExecutionStatusUpdate {
        #[ts(type = "string")]
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[serde(rename_all = "camelCase")]
    StepAttemptStarted {
        #[ts(type = "string")]
        execution_id: Uuid,
        step: StepName,
        attempt_number: u32,
    },

    #[serde(rename_all = "camelCase")]
    StepAttemptFinished {
        #[ts(type = "string")]
        execution_id: Uuid,
        step: StepName,
        attempt_number: u32,
        outcome: AttemptOutcome,
    },

    #[serde(rename_all = "camelCase")]
    ExecutionSucceeded {
        #[ts(type = "string")]
        execution_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    ExecutionFailed {
        #[ts(type = "string")]
        execution_id: Uuid,
        reason: TerminalReason,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    ExecutionTimedOut {
        #[ts(type = "string")]
        execution_id: Uuid,
    },

    /// A step result arrived after its attempt or execution had already
    /// been closed and was dropped.
    #[serde(rename_all = "camelCase")]
    LateResultDiscarded {
        #[ts(type = "string")]
        execution_id: Uuid,
        step: StepName,
        attempt_number: u32,
    },
}

impl Event {
    pub fn execution_id(&self) -> Uuid {
        match self {
            Event::ExecutionStarted { execution_id, .. }
            | Event::ExecutionStatusUpdate { execution_id, .. }
            | Event::StepAttemptStarted { execution_id, .. }
            | Event::StepAttemptFinished { execution_id, .. }
            | Event::ExecutionSucceeded { execution_id }
            | Event::ExecutionFailed { execution_id, .. }
            | Event::ExecutionTimedOut { execution_id }
            | Event::LateResultDiscarded { execution_id, .. } => *execution_id,
        }
    }

    /// Whether this event closes an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::ExecutionSucceeded { .. }
                | Event::ExecutionFailed { .. }
                | Event::ExecutionTimedOut { .. }
        )
    }
}
