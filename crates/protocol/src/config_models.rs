//! Orchestrator configuration models for `.product-catalog/config.toml`.
//!
//! Every timeout and retry knob of the orchestrator lives here so that none
//! of them is a hardcoded constant. Missing keys fall back to the defaults
//! below.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use ts_rs::TS;

use crate::workflow_models::StepName;

/// Top-level orchestrator settings.
///
/// # Example
///
/// ```toml
/// # .product-catalog/config.toml
/// execution_timeout_secs = 600
/// same_product_policy = "serialize"
/// timeout_cleanup = "retain"
///
/// [step_timeouts]
/// try_on_generation_secs = 180
///
/// [retry]
/// max_attempts = 3
/// initial_backoff_ms = 1000
/// backoff_rate = 2.0
/// permanent_error_codes = ["ValidationException"]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard ceiling on the wall-clock time of one execution, across all
    /// steps and retries.
    pub execution_timeout_secs: u64,

    pub step_timeouts: StepTimeouts,

    pub retry: RetryConfig,

    pub same_product_policy: SameProductPolicy,

    pub timeout_cleanup: TimeoutCleanup,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: 600,
            step_timeouts: StepTimeouts::default(),
            retry: RetryConfig::default(),
            same_product_policy: SameProductPolicy::default(),
            timeout_cleanup: TimeoutCleanup::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

/// Per-step timeouts, independent of the whole-execution timeout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct StepTimeouts {
    pub detect_labels_secs: u64,
    pub product_attribution_secs: u64,
    pub generic_attribution_secs: u64,
    pub try_on_generation_secs: u64,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            detect_labels_secs: 60,
            product_attribution_secs: 60,
            generic_attribution_secs: 60,
            try_on_generation_secs: 120,
        }
    }
}

impl StepTimeouts {
    pub fn for_step(&self, step: StepName) -> Duration {
        let secs = match step {
            StepName::DetectLabels => self.detect_labels_secs,
            StepName::ProductAttribution => self.product_attribution_secs,
            StepName::GenericAttribution => self.generic_attribution_secs,
            StepName::TryOnGeneration => self.try_on_generation_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Bounded retry with exponential backoff.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per step, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the delay after every retry.
    pub backoff_rate: f64,

    /// Upper bound on any single delay.
    pub max_backoff_ms: u64,

    /// Error codes that are never retried even when the step reported them
    /// as transient.
    pub permanent_error_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            backoff_rate: 2.0,
            max_backoff_ms: 30_000,
            permanent_error_codes: Vec::new(),
        }
    }
}

/// What happens when two executions target the same product id.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "snake_case")]
pub enum SameProductPolicy {
    /// Executions for one product run one after another, in start order.
    #[default]
    Serialize,

    /// Executions run concurrently; draft fields are last-writer-wins.
    Concurrent,
}

/// Whether a timed-out execution deletes the artifacts it may have written.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutCleanup {
    #[default]
    Retain,

    /// Delete `output/{productId}*` and `human-model-images/{productId}/*`.
    DeleteArtifacts,
}
