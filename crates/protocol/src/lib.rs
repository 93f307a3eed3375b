//! # pc-protocol
//!
//! Shared data models for the product catalog orchestrator.
//!
//! This crate defines all data structures exchanged between the core and its
//! front-ends, and persisted by the core:
//! - Workflow execution records and step attempts
//! - Product drafts and partial draft updates
//! - Orchestrator configuration
//! - Operations, responses and events
//!
//! ## Modules
//!
//! - [`workflow_models`]: Executions, attempts, step names and outputs
//! - [`product_models`]: Product drafts and their merge semantics
//! - [`config_models`]: Timeouts, retry policy and open-question policies
//! - [`ipc`]: Ops, Responses and Events
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, ts-rs, uuid and chrono
//! - TypeScript generation: all types derive `TS` for front-end compatibility
//! - Independent compilation: no dependencies on other workspace crates

pub mod config_models;
pub mod ipc;
pub mod product_models;
pub mod workflow_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use ipc::*;
pub use product_models::*;
pub use workflow_models::*;
