//! scriptfs: one filesystem contract for embedded script runtimes, backed by a
//! volatile in-memory tree or by a sandboxed directory on the host.

pub mod backend;
pub mod backends;
pub mod config;
pub mod error;
pub mod path;
pub mod pattern;
pub mod types;

// Re-export
pub use backend::*;
pub use backends::{MemoryFs, SandboxFs, probe_case_sensitivity};
pub use config::{BackendConfig, FsConfig};
pub use error::{VfsError, VfsResult};
pub use types::*;
