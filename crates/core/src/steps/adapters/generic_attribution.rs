//! Generic attribution step, used by the attribution-only workflow.

use crate::steps::adapters::{read_input_image, store_error, unexpected_payload};
use crate::steps::base::{Step, StepContext, StepError, StepPayload, StepRequest};
use crate::steps::inference::InferenceBackend;
use async_trait::async_trait;
use pc_protocol::product_models::{DraftPatch, DraftStatus, ImageRole};
use pc_protocol::workflow_models::{StepName, StepOutput};
use std::sync::Arc;

pub const STAGE_LABEL: &str = "Attribution Generated";

pub struct GenericAttributionStep {
    backend: Arc<dyn InferenceBackend>,
}

impl GenericAttributionStep {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Step for GenericAttributionStep {
    fn name(&self) -> StepName {
        StepName::GenericAttribution
    }

    async fn invoke(
        &self,
        context: &StepContext,
        request: StepRequest,
    ) -> Result<StepOutput, StepError> {
        let StepPayload::GenericAttribution {
            object_key,
            product_id,
        } = &request.payload
        else {
            return Err(unexpected_payload(self.name(), &request.payload));
        };

        let image = read_input_image(context, object_key).await?;
        let attributes = self.backend.infer_attributes(&image, &[]).await?;
        let attribute_count = attributes.len();

        // Nothing follows this step, so the draft is complete once it lands
        let patch = DraftPatch::new()
            .attributes(attributes)
            .image(ImageRole::Input, object_key.clone())
            .stage(DraftStatus::Complete, 100, STAGE_LABEL)
            .written_by(request.execution_id);
        context
            .records
            .merge(product_id, &patch)
            .await
            .map_err(store_error)?;

        Ok(StepOutput::Attribution {
            product_id: product_id.clone(),
            attribute_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::inference::StubInference;
    use crate::store::{InMemoryObjectStore, InMemoryRecordStore, ObjectStore, RecordStore};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_completes_draft() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let records = Arc::new(InMemoryRecordStore::new());
        objects.put("input/bag.png", b"png".to_vec()).await.unwrap();
        let context = StepContext::new(objects, records.clone());
        let step = GenericAttributionStep::new(Arc::new(StubInference::new()));

        step.invoke(
            &context,
            StepRequest {
                execution_id: Uuid::new_v4(),
                attempt_number: 1,
                payload: StepPayload::GenericAttribution {
                    object_key: "input/bag.png".to_string(),
                    product_id: "P7".to_string(),
                },
            },
        )
        .await
        .unwrap();

        let draft = records.get("P7").await.unwrap().expect("draft should exist");
        assert_eq!(draft.status, DraftStatus::Complete);
        assert_eq!(draft.progress, 100);
        assert_eq!(draft.current_step, STAGE_LABEL);
        assert!(draft.attributes.contains_key("title"));
    }

    #[tokio::test]
    async fn test_rejects_wrong_payload() {
        let context = StepContext::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRecordStore::new()),
        );
        let step = GenericAttributionStep::new(Arc::new(StubInference::new()));

        let err = step
            .invoke(
                &context,
                StepRequest {
                    execution_id: Uuid::new_v4(),
                    attempt_number: 1,
                    payload: StepPayload::DetectLabels {
                        object_key: "input/bag.png".to_string(),
                        product_id: "P7".to_string(),
                    },
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "UnexpectedPayload");
    }
}
