//! Execution state management.
//!
//! This module provides the execution record state machine, the recorder
//! that persists and announces every change, and the `StateManager` that
//! coordinates all executions.

pub mod execution;
pub mod manager;
pub mod recorder;

pub use execution::TransitionError;
pub use manager::StateManager;
pub use recorder::{ExecutionRecorder, SharedExecution};
