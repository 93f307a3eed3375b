//! Product attribution step.

use crate::steps::adapters::{read_input_image, store_error, unexpected_payload};
use crate::steps::base::{Step, StepContext, StepError, StepPayload, StepRequest};
use crate::steps::inference::InferenceBackend;
use async_trait::async_trait;
use pc_protocol::product_models::{DraftPatch, DraftStatus, ImageRole};
use pc_protocol::workflow_models::{Label, StepName, StepOutput};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const STAGE_LABEL: &str = "Product Attribution Generated";
pub const STAGE_PROGRESS: u8 = 66;

/// Infers product attributes guided by the detected labels and merges them,
/// with the label-derived categories, into the product draft.
pub struct ProductAttributionStep {
    backend: Arc<dyn InferenceBackend>,
}

impl ProductAttributionStep {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

/// Category fields derived from labels: the most confident label that has
/// parents is the root category.
fn category_attributes(labels: &[Label]) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();

    let root = labels
        .iter()
        .filter(|l| !l.parents.is_empty())
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
    if let Some(root) = root {
        let mut path = root.parents.clone();
        path.push(root.name.clone());
        attributes.insert("rootCategory".to_string(), root.name.clone());
        attributes.insert("parentCategories".to_string(), path.join(" > "));
    }

    let tags: BTreeSet<&str> = labels
        .iter()
        .flat_map(|l| l.parents.iter().map(String::as_str))
        .collect();
    if !tags.is_empty() {
        attributes.insert(
            "categoryTags".to_string(),
            tags.into_iter().collect::<Vec<_>>().join(","),
        );
    }

    attributes
}

#[async_trait]
impl Step for ProductAttributionStep {
    fn name(&self) -> StepName {
        StepName::ProductAttribution
    }

    async fn invoke(
        &self,
        context: &StepContext,
        request: StepRequest,
    ) -> Result<StepOutput, StepError> {
        let StepPayload::ProductAttribution {
            object_key,
            product_id,
            labels,
        } = &request.payload
        else {
            return Err(unexpected_payload(self.name(), &request.payload));
        };

        let image = read_input_image(context, object_key).await?;
        let mut attributes = self.backend.infer_attributes(&image, labels).await?;
        attributes.extend(category_attributes(labels));
        let attribute_count = attributes.len();

        let patch = DraftPatch::new()
            .attributes(attributes)
            .image(ImageRole::Input, object_key.clone())
            .stage(DraftStatus::Attributed, STAGE_PROGRESS, STAGE_LABEL)
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
