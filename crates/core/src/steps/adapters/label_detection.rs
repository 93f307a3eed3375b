//! Label detection step.

use crate::steps::adapters::{read_input_image, unexpected_payload};
use crate::steps::base::{Step, StepContext, StepError, StepPayload, StepRequest};
use crate::steps::inference::InferenceBackend;
use async_trait::async_trait;
use pc_protocol::workflow_models::{StepName, StepOutput};
use std::sync::Arc;

/// Detects labels in the source image. Writes nothing; the labels travel to
/// the attribution step through the execution history.
pub struct LabelDetectionStep {
    backend: Arc<dyn InferenceBackend>,
}

impl LabelDetectionStep {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Step for LabelDetectionStep {
    fn name(&self) -> StepName {
        StepName::DetectLabels
    }

    async fn invoke(
        &self,
        context: &StepContext,
        request: StepRequest,
    ) -> Result<StepOutput, StepError> {
        let StepPayload::DetectLabels { object_key, .. } = &request.payload else {
            return Err(unexpected_payload(self.name(), &request.payload));
        };

        let image = read_input_image(context, object_key).await?;
        let labels = self.backend.detect_labels(&image).await?;

        tracing::debug!(
            execution_id = %request.execution_id,
            count = labels.len(),
            "Detected labels"
        );
        Ok(StepOutput::Labels { labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::inference::StubInference;
    use crate::store::{InMemoryObjectStore, InMemoryRecordStore, ObjectStore, RecordStore};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_detects_labels_without_writing_records() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let records = Arc::new(InMemoryRecordStore::new());
        objects.put("input/shirt1.jpg", b"jpeg".to_vec()).await.unwrap();
        let context = StepContext::new(objects, records.clone());

        let step = LabelDetectionStep::new(Arc::new(StubInference::new()));
        let output = step
            .invoke(
                &context,
                StepRequest {
                    execution_id: Uuid::new_v4(),
                    attempt_number: 1,
                    payload: StepPayload::DetectLabels {
                        object_key: "input/shirt1.jpg".to_string(),
                        product_id: "P100".to_string(),
                    },
                },
            )
            .await
            .unwrap();

        let StepOutput::Labels { labels } = output else {
            panic!("expected labels output");
        };
        assert!(!labels.is_empty());
        assert!(records.get("P100").await.unwrap().is_none());
    }
}
