//! Try-on image generation step.
//!
//! Reads the garment image, uses (or generates) a human-model image, renders
//! the try-on image to `output/{productId}.jpg` and records the image
//! references on the draft.

use crate::steps::adapters::{read_input_image, store_error, unexpected_payload};
use crate::steps::base::{Step, StepContext, StepError, StepPayload, StepRequest};
use crate::steps::inference::InferenceBackend;
use crate::store::object::{HUMAN_MODEL_PREFIX, OUTPUT_PREFIX};
use async_trait::async_trait;
use pc_protocol::product_models::{DraftPatch, DraftStatus, ImageRole};
use pc_protocol::workflow_models::{StepName, StepOutput};
use std::sync::Arc;

pub const STAGE_LABEL: &str = "Images Generated";

pub struct TryOnStep {
    backend: Arc<dyn InferenceBackend>,
}

impl TryOnStep {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Key the generated human-model image is stored under.
    pub fn generated_model_key(product_id: &str) -> String {
        format!("{HUMAN_MODEL_PREFIX}{product_id}/1.png")
    }

    pub fn output_key(product_id: &str) -> String {
        format!("{OUTPUT_PREFIX}{product_id}.jpg")
    }

    /// Load the caller's human-model image, or generate and store one.
    async fn human_model(
        &self,
        context: &StepContext,
        product_id: &str,
        given: Option<&str>,
        garment: &[u8],
    ) -> Result<(String, Vec<u8>), StepError> {
        if let Some(key) = given {
            if !key.starts_with(HUMAN_MODEL_PREFIX) {
                return Err(StepError::permanent(
                    "InvalidHumanModelKey",
                    format!("'{key}' is not under {HUMAN_MODEL_PREFIX}"),
                ));
            }
            let body = context.objects.get(key).await.map_err(store_error)?;
            return Ok((key.to_string(), body));
        }

        let key = Self::generated_model_key(product_id);
        let body = self.backend.generate_human_model(garment).await?;
        context
            .objects
            .put(&key, body.clone())
            .await
            .map_err(store_error)?;
        Ok((key, body))
    }
}

#[async_trait]
impl Step for TryOnStep {
    fn name(&self) -> StepName {
        StepName::TryOnGeneration
    }

    async fn invoke(
        &self,
        context: &StepContext,
        request: StepRequest,
    ) -> Result<StepOutput, StepError> {
        let StepPayload::TryOnGeneration {
            object_key,
            product_id,
            human_model_image_key,
        } = &request.payload
        else {
            return Err(unexpected_payload(self.name(), &request.payload));
        };

        let garment = read_input_image(context, object_key).await?;
        let (human_model_key, human_model) = self
            .human_model(context, product_id, human_model_image_key.as_deref(), &garment)
            .await?;

        let rendered = self.backend.try_on(&garment, &human_model).await?;
        let output_key = Self::output_key(product_id);
        context
            .objects
            .put(&output_key, rendered)
            .await
            .map_err(store_error)?;

        let patch = DraftPatch::new()
            .image(ImageRole::HumanModel, human_model_key.clone())
            .image(ImageRole::TryOn, output_key.clone())
            .stage(DraftStatus::Complete, 100, STAGE_LABEL)
            .written_by(request.execution_id);
        context
            .records
            .merge(product_id, &patch)
            .await
            .map_err(store_error)?;

        tracing::debug!(
            execution_id = %request.execution_id,
            output_key = %output_key,
            "Try-on image written"
        );
        Ok(StepOutput::TryOn {
            output_key,
            human_model_key,
        })
    }
}
