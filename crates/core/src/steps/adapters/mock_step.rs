//! Mock step implementation for testing.

use crate::steps::base::{Step, StepContext, StepError, StepRequest};
use async_trait::async_trait;
use pc_protocol::product_models::DraftPatch;
use pc_protocol::workflow_models::{StepName, StepOutput};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A step that replays a fixed script of results.
///
/// Call `n` returns the `n`-th scripted result; once the script runs out the
/// last entry repeats. An empty script never returns.
#[derive(Clone)]
pub struct MockStep {
    name: StepName,
    script: Vec<Result<StepOutput, StepError>>,
    delay: Option<Duration>,
    patch: Option<DraftPatch>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<StepRequest>>>,
}

impl MockStep {
    pub fn new(name: StepName, script: Vec<Result<StepOutput, StepError>>) -> Self {
        Self {
            name,
            script,
            delay: None,
            patch: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn success(name: StepName, output: StepOutput) -> Self {
        Self::new(name, vec![Ok(output)])
    }

    pub fn failing(name: StepName, error: StepError) -> Self {
        Self::new(name, vec![Err(error)])
    }

    /// A step whose invocations never complete.
    pub fn hanging(name: StepName) -> Self {
        Self::new(name, Vec::new())
    }

    /// Wait this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Merge `patch` into the draft of the request's product on success.
    pub fn with_patch(mut self, patch: DraftPatch) -> Self {
        self.patch = Some(patch);
        self
    }

    /// Number of invocations started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Step for MockStep {
    fn name(&self) -> StepName {
        self.name
    }

    async fn invoke(
        &self,
        context: &StepContext,
        request: StepRequest,
    ) -> Result<StepOutput, StepError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let Some(last) = self.script.last() else {
            return std::future::pending().await;
        };
        let result = self.script.get(call).unwrap_or(last).clone();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let (Ok(_), Some(patch)) = (&result, &self.patch) {
            context
                .records
                .merge(request.payload.product_id(), patch)
                .await
                .map_err(|e| StepError::transient("StoreUnavailable", e.to_string()))?;
        }

        result
    }
}
