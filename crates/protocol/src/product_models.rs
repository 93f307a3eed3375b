//! Product draft models.
//!
//! The product draft is the per-product record accumulated by the pipeline
//! steps in the record store. The orchestrator never writes it; steps apply
//! [`DraftPatch`]es that merge fields instead of overwriting the record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use uuid::Uuid;

/// How far the pipeline has progressed for a product.
///
/// Ordered: a draft's status only ever advances.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, TS,
)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    #[default]
    Draft,
    Attributed,
    Complete,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Attributed => "attributed",
            DraftStatus::Complete => "complete",
        }
    }
}

/// Role of an image referenced from a draft.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TS,
)]
#[serde(rename_all = "camelCase")]
pub enum ImageRole {
    /// The uploaded source image (`input/*`).
    Input,
    /// The human-model image used for try-on (`human-model-images/*`).
    HumanModel,
    /// The generated try-on image (`output/*`).
    TryOn,
}

/// The persistent per-product record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    /// Partition key, equal to the execution's product identifier.
    #[serde(rename = "Id")]
    pub id: String,

    /// Inferred attribute name to value.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Object store keys by role.
    #[serde(default)]
    pub image_refs: BTreeMap<ImageRole, String>,

    #[serde(default)]
    pub status: DraftStatus,

    /// Percentage shown to external observers.
    #[serde(default)]
    pub progress: u8,

    /// Human-readable label of the last completed stage.
    #[serde(default)]
    pub current_step: String,

    /// Execution that last wrote to the draft.
    #[serde(default)]
    #[ts(type = "string | null")]
    pub execution_id: Option<Uuid>,
}

impl ProductDraft {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Apply a partial update.
    ///
    /// Map fields merge per key. `status` never moves backwards; `progress`
    /// and `current_step` are only taken from a patch whose status is not
    /// behind the record's. Applying the same patch twice is a no-op the
    /// second time.
    pub fn merge(&mut self, patch: &DraftPatch) {
        for (k, v) in &patch.attributes {
            self.attributes.insert(k.clone(), v.clone());
        }
        for (role, key) in &patch.image_refs {
            self.image_refs.insert(*role, key.clone());
        }

        let advances = match patch.status {
            Some(status) if status > self.status => {
                self.status = status;
                true
            }
            Some(status) => status == self.status,
            None => true,
        };

        if advances {
            if let Some(progress) = patch.progress {
                self.progress = self.progress.max(progress.min(100));
            }
            if let Some(step) = &patch.current_step {
                self.current_step = step.clone();
            }
        }

        if patch.execution_id.is_some() {
            self.execution_id = patch.execution_id;
        }
    }
}

/// A partial update of a [`ProductDraft`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatch {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub image_refs: BTreeMap<ImageRole, String>,

    #[serde(default)]
    pub status: Option<DraftStatus>,

    #[serde(default)]
    pub progress: Option<u8>,

    #[serde(default)]
    pub current_step: Option<String>,

    #[serde(default)]
    #[ts(type = "string | null")]
    pub execution_id: Option<Uuid>,
}

impl DraftPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn image(mut self, role: ImageRole, key: impl Into<String>) -> Self {
        self.image_refs.insert(role, key.into());
        self
    }

    pub fn stage(mut self, status: DraftStatus, progress: u8, current_step: &str) -> Self {
        self.status = Some(status);
        self.progress = Some(progress);
        self.current_step = Some(current_step.to_string());
        self
    }

    pub fn written_by(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }
}
