//! Base Step trait and supporting types.

use crate::store::{ObjectStore, RecordStore};
use async_trait::async_trait;
use pc_protocol::workflow_models::{Label, StepName, StepOutput};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Store capabilities handed to a step for one invocation.
///
/// Steps reach the object and record stores only through this context, so a
/// step can be exercised in isolation against in-memory stores.
#[derive(Clone)]
pub struct StepContext {
    pub objects: Arc<dyn ObjectStore>,
    pub records: Arc<dyn RecordStore>,
}

impl StepContext {
    pub fn new(objects: Arc<dyn ObjectStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { objects, records }
    }
}

/// Step-specific input. Every variant carries the source object key and the
/// product identifier; large data always stays in the stores.
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    DetectLabels {
        object_key: String,
        product_id: String,
    },
    ProductAttribution {
        object_key: String,
        product_id: String,
        /// Labels from the detection step. May be empty.
        labels: Vec<Label>,
    },
    GenericAttribution {
        object_key: String,
        product_id: String,
    },
    TryOnGeneration {
        object_key: String,
        product_id: String,
        /// `None` asks the step to generate a model image itself.
        human_model_image_key: Option<String>,
    },
}

impl StepPayload {
    /// The step this payload is addressed to.
    pub fn step_name(&self) -> StepName {
        match self {
            StepPayload::DetectLabels { .. } => StepName::DetectLabels,
            StepPayload::ProductAttribution { .. } => StepName::ProductAttribution,
            StepPayload::GenericAttribution { .. } => StepName::GenericAttribution,
            StepPayload::TryOnGeneration { .. } => StepName::TryOnGeneration,
        }
    }

    pub fn object_key(&self) -> &str {
        match self {
            StepPayload::DetectLabels { object_key, .. }
            | StepPayload::ProductAttribution { object_key, .. }
            | StepPayload::GenericAttribution { object_key, .. }
            | StepPayload::TryOnGeneration { object_key, .. } => object_key,
        }
    }

    pub fn product_id(&self) -> &str {
        match self {
            StepPayload::DetectLabels { product_id, .. }
            | StepPayload::ProductAttribution { product_id, .. }
            | StepPayload::GenericAttribution { product_id, .. }
            | StepPayload::TryOnGeneration { product_id, .. } => product_id,
        }
    }
}

/// One invocation request: who is calling, which attempt, and the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    pub execution_id: Uuid,
    pub attempt_number: u32,
    pub payload: StepPayload,
}

/// Structured error returned by a step, classified for retry purposes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Eligible for retry (throttling, upstream hiccups).
    #[error("{code}: {message}")]
    Transient { code: String, message: String },

    /// Never retried (malformed or unsupported input).
    #[error("{code}: {message}")]
    Permanent { code: String, message: String },
}

impl StepError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        StepError::Transient {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        StepError::Permanent {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            StepError::Transient { code, .. } | StepError::Permanent { code, .. } => code,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StepError::Transient { .. })
    }
}

/// A stateless unit of external work invoked by the orchestrator.
///
/// Implementations read and write the stores through the [`StepContext`]
/// and return a small [`StepOutput`]. Invoking a step twice with the same
/// request must leave the stores in the same state as invoking it once.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> StepName;

    async fn invoke(
        &self,
        context: &StepContext,
        request: StepRequest,
    ) -> Result<StepOutput, StepError>;
}
