//! State-machine definitions for the catalog and attribution workflows.

use crate::steps::base::StepPayload;
use pc_protocol::workflow_models::{
    AttemptOutcome, StepName, StepOutput, TerminalReason, Topology, WorkflowExecution,
};
use std::collections::HashSet;
use thiserror::Error;

/// Errors found while validating a workflow definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Workflow {topology} has no state named '{state}'")]
    UnknownState { topology: Topology, state: String },

    #[error("Workflow {topology} defines state '{state}' more than once")]
    DuplicateState { topology: Topology, state: String },

    #[error("Workflow {topology} never reaches a final state from '{state}'")]
    Cycle { topology: Topology, state: String },

    #[error("Workflow {topology} has unreachable state '{state}'")]
    Unreachable { topology: Topology, state: String },
}

/// Where a state goes after its step succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(&'static str),
    Succeed,
}

/// One state: the step it invokes and what happens on each outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDefinition {
    pub name: &'static str,
    pub step: StepName,
    /// Failure reason when the step fails permanently or exhausts its retries.
    pub on_exhausted: TerminalReason,
    pub next: Transition,
}

impl StateDefinition {
    /// Build the step payload for this state from the execution's input and
    /// the outputs of earlier successful steps.
    pub fn payload_for(&self, execution: &WorkflowExecution) -> StepPayload {
        let object_key = execution.input.object_key.clone();
        let product_id = execution.input.product_id.clone();

        match self.step {
            StepName::DetectLabels => StepPayload::DetectLabels {
                object_key,
                product_id,
            },
            StepName::ProductAttribution => {
                let labels = match execution.successful_output(StepName::DetectLabels) {
                    Some(StepOutput::Labels { labels }) => labels.clone(),
                    _ => Vec::new(),
                };
                StepPayload::ProductAttribution {
                    object_key,
                    product_id,
                    labels,
                }
            }
            StepName::GenericAttribution => StepPayload::GenericAttribution {
                object_key,
                product_id,
            },
            StepName::TryOnGeneration => StepPayload::TryOnGeneration {
                object_key,
                product_id,
                human_model_image_key: execution.input.human_model_image_key.clone(),
            },
        }
    }
}

/// An immutable, linear state machine for one topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    pub topology: Topology,
    pub start: &'static str,
    pub states: Vec<StateDefinition>,
}

impl WorkflowDefinition {
    /// Detect labels, generate product attribution, generate a try-on image.
    pub fn catalog() -> Self {
        Self {
            topology: Topology::CatalogWorkflow,
            start: "DetectLabels",
            states: vec![
                StateDefinition {
                    name: "DetectLabels",
                    step: StepName::DetectLabels,
                    on_exhausted: TerminalReason::LabelDetectionExhausted,
                    next: Transition::Next("GenerateProductAttribution"),
                },
                StateDefinition {
                    name: "GenerateProductAttribution",
                    step: StepName::ProductAttribution,
                    on_exhausted: TerminalReason::AttributionExhausted,
                    next: Transition::Next("GenerateTryOnImage"),
                },
                StateDefinition {
                    name: "GenerateTryOnImage",
                    step: StepName::TryOnGeneration,
                    on_exhausted: TerminalReason::TryOnExhausted,
                    next: Transition::Succeed,
                },
            ],
        }
    }

    /// Generate generic attribution only.
    pub fn attribution() -> Self {
        Self {
            topology: Topology::AttributionWorkflow,
            start: "GenerateGenericAttribution",
            states: vec![StateDefinition {
                name: "GenerateGenericAttribution",
                step: StepName::GenericAttribution,
                on_exhausted: TerminalReason::GenericAttributionExhausted,
                next: Transition::Succeed,
            }],
        }
    }

    pub fn state(&self, name: &str) -> Option<&StateDefinition> {
        self.states.iter().find(|s| s.name == name)
    }

    /// The state entered after `state` succeeds, or `None` when the
    /// workflow succeeds.
    pub fn next_state(&self, state: &StateDefinition) -> Option<&StateDefinition> {
        match state.next {
            Transition::Next(name) => self.state(name),
            Transition::Succeed => None,
        }
    }

    /// States in execution order, from `start` to the final state.
    pub fn path(&self) -> Vec<&StateDefinition> {
        let mut path = Vec::new();
        let mut current = self.state(self.start);
        while let Some(state) = current {
            if path.len() >= self.states.len() {
                break;
            }
            path.push(state);
            current = self.next_state(state);
        }
        path
    }

    /// The state an execution should run next: the first state on the path
    /// whose step has no successful attempt. `None` means every state has
    /// already succeeded.
    pub fn resume_state(&self, execution: &WorkflowExecution) -> Option<&StateDefinition> {
        self.path().into_iter().find(|state| {
            !execution
                .attempts_for(state.step)
                .any(|a| a.outcome == AttemptOutcome::Success)
        })
    }

    /// Check that the definition is a well-formed linear state machine.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if a state name is duplicated, a transition
    /// targets an unknown state, the transitions loop, or a state cannot be
    /// reached from `start`.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let topology = self.topology;
        let mut names = HashSet::new();
        for state in &self.states {
            if !names.insert(state.name) {
                return Err(DefinitionError::DuplicateState {
                    topology,
                    state: state.name.to_string(),
                });
            }
        }

        let unknown = |state: &str| DefinitionError::UnknownState {
            topology,
            state: state.to_string(),
        };
        let mut current = self.state(self.start).ok_or_else(|| unknown(self.start))?;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current.name) {
                return Err(DefinitionError::Cycle {
                    topology,
                    state: current.name.to_string(),
                });
            }
            match current.next {
                Transition::Succeed => break,
                Transition::Next(name) => {
                    current = self.state(name).ok_or_else(|| unknown(name))?;
                }
            }
        }

        if let Some(orphan) = self.states.iter().find(|s| !visited.contains(s.name)) {
            return Err(DefinitionError::Unreachable {
                topology,
                state: orphan.name.to_string(),
            });
        }

        Ok(())
    }
}

/// The validated definitions of every topology, shared by all executions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinitions {
    catalog: WorkflowDefinition,
    attribution: WorkflowDefinition,
}

impl WorkflowDefinitions {
    /// Build and validate the built-in definitions.
    pub fn standard() -> Result<Self, DefinitionError> {
        let definitions = Self {
            catalog: WorkflowDefinition::catalog(),
            attribution: WorkflowDefinition::attribution(),
        };
        definitions.catalog.validate()?;
        definitions.attribution.validate()?;
        Ok(definitions)
    }

    pub fn get(&self, topology: Topology) -> &WorkflowDefinition {
        match topology {
            Topology::CatalogWorkflow => &self.catalog,
            Topology::AttributionWorkflow => &self.attribution,
        }
    }
}
