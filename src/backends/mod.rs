pub mod memory;
pub mod sandbox;

pub use memory::MemoryFs;
pub use sandbox::{SandboxFs, probe_case_sensitivity};
