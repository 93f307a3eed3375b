//! Workflow execution models.
//!
//! This module defines the durable record of one workflow run: the
//! execution itself, the append-only history of step attempts, and the
//! small structured outputs that steps hand back to the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

/// The fixed pipeline topologies the orchestrator knows how to run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
pub enum Topology {
    /// Detect labels, generate product attribution, generate a try-on image.
    CatalogWorkflow,

    /// Generate generic attribution only.
    AttributionWorkflow,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::CatalogWorkflow => write!(f, "CatalogWorkflow"),
            Topology::AttributionWorkflow => write!(f, "AttributionWorkflow"),
        }
    }
}

/// The bounded set of external steps a workflow can invoke.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TS,
)]
pub enum StepName {
    DetectLabels,
    ProductAttribution,
    GenericAttribution,
    TryOnGeneration,
}

impl StepName {
    /// All step names, in catalog pipeline order.
    pub const ALL: [StepName; 4] = [
        StepName::DetectLabels,
        StepName::ProductAttribution,
        StepName::GenericAttribution,
        StepName::TryOnGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::DetectLabels => "DetectLabels",
            StepName::ProductAttribution => "ProductAttribution",
            StepName::GenericAttribution => "GenericAttribution",
            StepName::TryOnGeneration => "TryOnGeneration",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a workflow execution.
///
/// An execution starts `Running` and moves to exactly one terminal status.
/// Terminal statuses never change afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

/// Outcome of a single step attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    /// The attempt has been dispatched and no result has been recorded yet.
    Pending,
    Success,
    Failure,
    Timeout,
}

impl AttemptOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptOutcome::Pending)
    }
}

/// Reason tag attached to a terminal `Failed` or `TimedOut` execution.
///
/// The `*Exhausted` variants name the state whose retry budget ran out or
/// which hit a permanent failure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
pub enum TerminalReason {
    LabelDetectionExhausted,
    AttributionExhausted,
    GenericAttributionExhausted,
    TryOnExhausted,
    ExecutionTimeout,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalReason::LabelDetectionExhausted => "LabelDetectionExhausted",
            TerminalReason::AttributionExhausted => "AttributionExhausted",
            TerminalReason::GenericAttributionExhausted => "GenericAttributionExhausted",
            TerminalReason::TryOnExhausted => "TryOnExhausted",
            TerminalReason::ExecutionTimeout => "ExecutionTimeout",
        };
        f.write_str(s)
    }
}

/// A label detected in a source image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub name: String,

    /// Detection confidence in percent (0-100).
    pub confidence: f32,

    /// Parent categories, most general first.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl Label {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }
}

/// Small structured result returned by a successful step.
///
/// Steps never return large payloads: images live in the object store and
/// attributes live in the record store, so outputs carry references and
/// counts only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum StepOutput {
    /// Labels detected by the label detection step. May be empty.
    #[serde(rename_all = "camelCase")]
    Labels { labels: Vec<Label> },

    /// Attributes were merged into the product draft.
    #[serde(rename_all = "camelCase")]
    Attribution {
        product_id: String,
        attribute_count: usize,
    },

    /// A try-on image was written to the object store.
    #[serde(rename_all = "camelCase")]
    TryOn {
        output_key: String,
        human_model_key: String,
    },
}

/// Caller-supplied input of a workflow execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInput {
    /// Object store key of the source image, under `input/`.
    pub object_key: String,

    /// Product identifier, also the record store key of the draft.
    pub product_id: String,

    /// Optional pre-existing human-model image, under `human-model-images/`.
    ///
    /// `None` means "absent": the try-on step generates a model image itself.
    #[serde(default)]
    pub human_model_image_key: Option<String>,
}

impl ExecutionInput {
    pub fn new(object_key: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            product_id: product_id.into(),
            human_model_image_key: None,
        }
    }

    pub fn with_human_model(mut self, key: impl Into<String>) -> Self {
        self.human_model_image_key = Some(key.into());
        self
    }
}

/// One invocation of one step within an execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct StepAttempt {
    pub step_name: StepName,

    /// 1-based, strictly increasing per step within an execution.
    pub attempt_number: u32,

    pub outcome: AttemptOutcome,

    /// Set only when `outcome` is `Success`.
    #[serde(default)]
    pub output: Option<StepOutput>,

    /// Error code and message for `Failure` and `Timeout` outcomes.
    #[serde(default)]
    pub error: Option<String>,

    /// A `Failure` the retry policy ruled out retrying. Survives restarts so
    /// a resumed run does not try the step again.
    #[serde(default)]
    pub permanent: bool,

    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// The durable record of one run of a workflow topology.
///
/// `status` is terminal iff `ended_at` is set. `history` is append-only and
/// ordered by attempt start time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    #[ts(type = "string")]
    pub execution_id: Uuid,

    pub topology: Topology,

    pub input: ExecutionInput,

    pub status: ExecutionStatus,

    /// Why the execution ended, for `Failed` and `TimedOut` executions.
    #[serde(default)]
    pub reason: Option<TerminalReason>,

    /// Last error message observed before the execution failed.
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub history: Vec<StepAttempt>,

    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Attempts recorded for `step`, in attempt order.
    pub fn attempts_for(&self, step: StepName) -> impl Iterator<Item = &StepAttempt> {
        self.history.iter().filter(move |a| a.step_name == step)
    }

    /// Output of the successful attempt of `step`, if any.
    pub fn successful_output(&self, step: StepName) -> Option<&StepOutput> {
        self.attempts_for(step)
            .find(|a| a.outcome == AttemptOutcome::Success)
            .and_then(|a| a.output.as_ref())
    }

    /// The attempt currently in flight, if any.
    pub fn pending_attempt(&self) -> Option<&StepAttempt> {
        self.history
            .iter()
            .find(|a| a.outcome == AttemptOutcome::Pending)
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: self.execution_id,
            topology: self.topology,
            product_id: self.input.product_id.clone(),
            status: self.status,
            reason: self.reason,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Condensed view of an execution used for listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    #[ts(type = "string")]
    pub execution_id: Uuid,
    pub topology: Topology,
    pub product_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub reason: Option<TerminalReason>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}
