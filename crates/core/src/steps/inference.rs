//! Inference backend used by the built-in steps.
//!
//! Model calls (label detection, attribute inference, image generation) sit
//! behind [`InferenceBackend`] so the built-in steps only deal with the
//! stores. [`StubInference`] is a deterministic backend for local runs and
//! tests.

use crate::steps::base::StepError;
use async_trait::async_trait;
use pc_protocol::workflow_models::Label;
use std::collections::BTreeMap;

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Labels visible in the image. An empty result is valid.
    async fn detect_labels(&self, image: &[u8]) -> Result<Vec<Label>, StepError>;

    /// Attribute name to value, guided by `labels` when there are any.
    async fn infer_attributes(
        &self,
        image: &[u8],
        labels: &[Label],
    ) -> Result<BTreeMap<String, String>, StepError>;

    /// A human-model image to dress in the garment.
    async fn generate_human_model(&self, garment: &[u8]) -> Result<Vec<u8>, StepError>;

    /// Render the garment on the human model.
    async fn try_on(&self, garment: &[u8], human_model: &[u8]) -> Result<Vec<u8>, StepError>;
}

/// Deterministic backend: same input, same output, no network.
#[derive(Debug, Clone, Default)]
pub struct StubInference;

impl StubInference {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InferenceBackend for StubInference {
    async fn detect_labels(&self, image: &[u8]) -> Result<Vec<Label>, StepError> {
        if image.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![
            Label::new("Shirt", 97.4)
                .with_parents(vec!["Apparel".to_string(), "Clothing".to_string()]),
            Label::new("Clothing", 99.1),
            Label::new("Sleeve", 88.0).with_parents(vec!["Clothing".to_string()]),
        ])
    }

    async fn infer_attributes(
        &self,
        image: &[u8],
        labels: &[Label],
    ) -> Result<BTreeMap<String, String>, StepError> {
        if image.is_empty() {
            return Err(StepError::permanent(
                "InvalidImage",
                "image body is empty",
            ));
        }

        let kind = labels
            .iter()
            .find(|l| !l.parents.is_empty())
            .map_or("Product", |l| l.name.as_str());

        let mut attributes = BTreeMap::new();
        attributes.insert("title".to_string(), format!("Classic {kind}"));
        attributes.insert(
            "description".to_string(),
            format!("A {} photographed for the catalog.", kind.to_lowercase()),
        );
        attributes.insert("style".to_string(), "casual".to_string());
        Ok(attributes)
    }

    async fn generate_human_model(&self, garment: &[u8]) -> Result<Vec<u8>, StepError> {
        let mut body = b"stub-human-model:".to_vec();
        body.extend_from_slice(&(garment.len() as u64).to_be_bytes());
        Ok(body)
    }

    async fn try_on(&self, garment: &[u8], human_model: &[u8]) -> Result<Vec<u8>, StepError> {
        let mut body = b"stub-try-on:".to_vec();
        body.extend_from_slice(human_model);
        body.extend_from_slice(garment);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_is_deterministic() {
        let backend = StubInference::new();
        let image = b"jpeg-bytes";

        let labels = backend.detect_labels(image).await.unwrap();
        assert_eq!(labels, backend.detect_labels(image).await.unwrap());

        let first = backend.infer_attributes(image, &labels).await.unwrap();
        let second = backend.infer_attributes(image, &labels).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get("title"), Some(&"Classic Shirt".to_string()));
    }

    #[tokio::test]
    async fn test_stub_detects_nothing_in_empty_image() {
        let backend = StubInference::new();
        assert!(backend.detect_labels(b"").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stub_attributes_without_labels() {
        let backend = StubInference::new();
        let attributes = backend.infer_attributes(b"png", &[]).await.unwrap();
        assert_eq!(attributes.get("title"), Some(&"Classic Product".to_string()));
    }
}
