//! Pipeline steps and their contracts.
//!
//! This module provides the `Step` trait (Adapter Pattern), the built-in
//! step adapters, the inference backend they delegate model calls to, and
//! the `StepRegistry` the engine resolves steps from.

pub mod adapters;
pub mod base;
pub mod inference;
pub mod registry;

pub use adapters::MockStep;
pub use base::{Step, StepContext, StepError, StepPayload, StepRequest};
pub use inference::{InferenceBackend, StubInference};
pub use registry::StepRegistry;
