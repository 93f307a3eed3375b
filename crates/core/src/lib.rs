//! # pc-core
//!
//! Workflow orchestration engine for the product catalog pipeline.
//!
//! This crate provides:
//! - Configuration loading from the `.product-catalog/` directory
//! - Object, record and execution stores
//! - The step contract and the built-in pipeline steps
//! - Immutable workflow definitions and the engine that drives them
//! - State management for running and interrupted executions
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and project layout
//! - [`store`]: Store traits with in-memory and filesystem backends
//! - [`steps`]: Step trait, registry and adapter implementations
//! - [`workflow`]: State-machine definitions of the two topologies
//! - [`engine`]: Retry policy, step invoker and workflow engine
//! - [`state`]: Execution transitions, recorder and state manager

pub mod config;
pub mod engine;
pub mod state;
pub mod steps;
pub mod store;
pub mod workflow;
