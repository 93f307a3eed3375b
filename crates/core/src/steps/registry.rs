//! Step registry: maps step names to their implementations.

use crate::steps::adapters::{
    GenericAttributionStep, LabelDetectionStep, ProductAttributionStep, TryOnStep,
};
use crate::steps::base::Step;
use crate::steps::inference::InferenceBackend;
use pc_protocol::workflow_models::StepName;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds one [`Step`] implementation per [`StepName`].
///
/// The engine looks steps up here when a state is entered, so tests can swap
/// any single step for a scripted one.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<StepName, Arc<dyn Step>>,
}

impl StepRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the four built-in steps wired to `backend`.
    ///
    /// # Arguments
    ///
    /// * `backend` - Inference backend shared by all built-in steps
    pub fn builtin(backend: Arc<dyn InferenceBackend>) -> Self {
        Self::new()
            .with_step(Arc::new(LabelDetectionStep::new(backend.clone())))
            .with_step(Arc::new(ProductAttributionStep::new(backend.clone())))
            .with_step(Arc::new(GenericAttributionStep::new(backend.clone())))
            .with_step(Arc::new(TryOnStep::new(backend)))
    }

    /// Register `step` under its own name, replacing any previous entry.
    pub fn with_step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.insert(step.name(), step);
        self
    }

    pub fn get(&self, name: StepName) -> Option<Arc<dyn Step>> {
        self.steps.get(&name).cloned()
    }

    pub fn has_step(&self, name: StepName) -> bool {
        self.steps.contains_key(&name)
    }

    /// Registered step names, sorted.
    pub fn list_steps(&self) -> Vec<StepName> {
        let mut names: Vec<_> = self.steps.keys().copied().collect();
        names.sort();
        names
    }
}
