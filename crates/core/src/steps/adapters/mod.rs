//! Step adapter implementations.
//!
//! The built-in adapters implement the store contracts of each pipeline
//! stage on top of an [`InferenceBackend`](crate::steps::InferenceBackend).

mod generic_attribution;
mod label_detection;
pub mod mock_step;
mod product_attribution;
mod try_on;

pub use generic_attribution::GenericAttributionStep;
pub use label_detection::LabelDetectionStep;
pub use mock_step::MockStep;
pub use product_attribution::ProductAttributionStep;
pub use try_on::TryOnStep;

use crate::steps::base::{StepContext, StepError, StepPayload};
use crate::store::object::INPUT_PREFIX;
use crate::store::StoreError;
use pc_protocol::workflow_models::StepName;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Translate a store failure into a classified step error.
///
/// Missing objects and bad keys will not fix themselves on retry; I/O
/// problems might.
pub(crate) fn store_error(err: StoreError) -> StepError {
    match err {
        StoreError::NotFound { key } => {
            StepError::permanent("ObjectNotFound", format!("no object at '{key}'"))
        }
        StoreError::InvalidKey { key, reason } => {
            StepError::permanent("InvalidKey", format!("'{key}': {reason}"))
        }
        StoreError::AlreadyExists { key } => {
            StepError::permanent("AlreadyExists", format!("record '{key}' already exists"))
        }
        other => StepError::transient("StoreUnavailable", other.to_string()),
    }
}

/// Whether `key` ends with a supported image extension.
pub(crate) fn has_image_extension(key: &str) -> bool {
    key.rsplit_once('.').is_some_and(|(_, ext)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// Validate and read the source image of a step.
pub(crate) async fn read_input_image(
    context: &StepContext,
    object_key: &str,
) -> Result<Vec<u8>, StepError> {
    if !object_key.starts_with(INPUT_PREFIX) {
        return Err(StepError::permanent(
            "InvalidObjectKey",
            format!("'{object_key}' is not under {INPUT_PREFIX}"),
        ));
    }
    if !has_image_extension(object_key) {
        return Err(StepError::permanent(
            "UnsupportedImageFormat",
            format!("'{object_key}' is not a jpg, jpeg or png image"),
        ));
    }

    context.objects.get(object_key).await.map_err(store_error)
}

pub(crate) fn unexpected_payload(step: StepName, payload: &StepPayload) -> StepError {
    StepError::permanent(
        "UnexpectedPayload",
        format!("{step} cannot handle a {} payload", payload.step_name()),
    )
}
