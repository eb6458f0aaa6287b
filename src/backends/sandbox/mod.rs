//! Sandboxed host backend: the real filesystem below one root directory.

mod fs;
mod probe;

#[cfg(test)]
mod tests;

pub use fs::SandboxFs;
pub use probe::probe_case_sensitivity;
