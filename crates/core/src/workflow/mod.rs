//! Workflow topologies as explicit state-machine definitions.
//!
//! Definitions are built and validated once at start-up and shared
//! read-only by every execution.

pub mod definition;

pub use definition::{
    DefinitionError, StateDefinition, Transition, WorkflowDefinition, WorkflowDefinitions,
};
