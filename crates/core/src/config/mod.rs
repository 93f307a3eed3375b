//! Configuration loading and project directory layout.
//!
//! This module loads the orchestrator settings from the `.product-catalog/`
//! directory and knows where the filesystem-backed stores live inside it.

pub mod error;
pub mod layout;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use layout::ProjectLayout;
pub use loader::load_config;
