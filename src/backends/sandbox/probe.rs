use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{VfsError, VfsResult};

/// Reports whether the filesystem holding `dir` tells apart names that differ
/// only in case.
///
/// A scratch directory with a mixed-case name is created inside `dir` and
/// looked up again in lower case; it is removed before returning. Run this
/// once where the process assembles its dependencies and hand the answer to
/// [`SandboxFs::new`](super::SandboxFs::new).
pub fn probe_case_sensitivity(dir: &Path) -> VfsResult<bool> {
    let shown = dir.display().to_string();
    let scratch = tempfile::Builder::new()
        .prefix("CaseProbe")
        .tempdir_in(dir)
        .map_err(|e| VfsError::host("probe case sensitivity of", &shown, e))?;

    let name = scratch
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| VfsError::InvalidArgument(format!("unreadable probe name in {}", shown)))?;
    let folded = dir.join(name.to_lowercase());

    match fs::symlink_metadata(&folded) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(VfsError::host("probe case sensitivity of", &shown, e)),
    }
}
