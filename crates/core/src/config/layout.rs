//! Layout of the `.product-catalog/` project directory.

use std::path::{Path, PathBuf};

/// Name of the project directory under the root.
pub const PROJECT_DIR: &str = ".product-catalog";

/// Paths of everything the orchestrator keeps under `.product-catalog/`.
///
/// ```text
/// .product-catalog/
/// ├── config.toml
/// ├── executions/   one JSON document per workflow execution
/// ├── objects/      object store (input/, human-model-images/, output/)
/// └── records/      one JSON document per product draft
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(PROJECT_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    pub fn executions_dir(&self) -> PathBuf {
        self.dir.join("executions")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.dir.join("objects")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.dir.join("records")
    }
}
