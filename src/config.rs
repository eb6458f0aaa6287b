//! Backend selection, made once when the process assembles its dependencies.
//!
//! ```json
//! { "backend": "sandbox", "root": "/srv/scripts", "case_sensitive": true }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::FileSystem;
use crate::backends::{MemoryFs, SandboxFs, probe_case_sensitivity};
use crate::error::{VfsError, VfsResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    Sandbox { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsConfig {
    #[serde(flatten)]
    pub backend: BackendConfig,
    /// Unset means case-sensitive for memory and probed for sandboxes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

impl FsConfig {
    pub fn memory() -> Self {
        Self {
            backend: BackendConfig::Memory,
            case_sensitive: None,
        }
    }

    pub fn sandbox(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sandbox { root: root.into() },
            case_sensitive: None,
        }
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }

    pub fn from_json(text: &str) -> VfsResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| VfsError::InvalidArgument(format!("filesystem config: {}", e)))
    }

    /// Builds the configured backend.
    pub fn build(&self) -> VfsResult<Box<dyn FileSystem>> {
        match &self.backend {
            BackendConfig::Memory => {
                let case_sensitive = self.case_sensitive.unwrap_or(true);
                info!(case_sensitive, "using in-memory filesystem");
                Ok(Box::new(MemoryFs::new(case_sensitive)))
            }
            BackendConfig::Sandbox { root } => {
                let case_sensitive = match self.case_sensitive {
                    Some(value) => value,
                    None => probe_case_sensitivity(root)?,
                };
                info!(root = %root.display(), case_sensitive, "using sandboxed host filesystem");
                Ok(Box::new(SandboxFs::new(root, case_sensitive)?))
            }
        }
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        Self::memory()
    }
}
