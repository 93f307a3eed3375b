//! Retry policy injected into the step invoker.

use crate::steps::base::StepError;
use pc_protocol::config_models::RetryConfig;
use std::collections::HashSet;
use std::time::Duration;

/// Bounded retry with exponential backoff and a transient/permanent
/// classifier. Shared by every step; nothing here is step-specific.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_rate: f64,
    pub max_backoff: Duration,
    permanent_codes: HashSet<String>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, backoff_rate: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            backoff_rate,
            max_backoff: Duration::MAX,
            permanent_codes: HashSet::new(),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            backoff_rate: config.backoff_rate,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            permanent_codes: config.permanent_error_codes.iter().cloned().collect(),
        }
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Treat `code` as permanent even when a step reports it as transient.
    pub fn with_permanent_code(mut self, code: impl Into<String>) -> Self {
        self.permanent_codes.insert(code.into());
        self
    }

    pub fn is_permanent(&self, error: &StepError) -> bool {
        !error.is_transient() || self.permanent_codes.contains(error.code())
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay between attempt `attempt` and the next one:
    /// `initial * rate^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_rate.powi(exponent);
        let cap = self.max_backoff.as_secs_f64();

        if !secs.is_finite() || secs >= cap {
            return self.max_backoff;
        }
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
