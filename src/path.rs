//! Path canonicalization shared by the memory and sandbox backends.
//!
//! A canonical path is absolute, `/`-separated, has no trailing separator
//! (except the root itself), no empty, `.` or `..` segments, and has the case
//! policy of its filesystem applied.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{VfsError, VfsResult};

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

/// Turns caller-supplied paths into canonical paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResolver {
    fold_case: bool,
}

impl PathResolver {
    /// Resolver for a filesystem with the given case policy. Case-insensitive
    /// filesystems store and look up every segment lower-cased.
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            fold_case: !case_sensitive,
        }
    }

    pub fn folds_case(&self) -> bool {
        self.fold_case
    }

    /// Applies the case policy to a path or pattern.
    pub fn fold(&self, s: &str) -> String {
        if self.fold_case {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    }

    /// Resolves `path` against the canonical directory `cwd`.
    ///
    /// `..` above the root stays at the root.
    pub fn resolve(&self, cwd: &str, path: &str) -> String {
        match self.normalize(cwd, path) {
            Normalized::Path(p) | Normalized::Escaped(p) => p,
        }
    }

    /// Like [`resolve`](Self::resolve) but fails when `..` would climb above
    /// the root.
    pub fn resolve_contained(&self, cwd: &str, path: &str) -> VfsResult<String> {
        match self.normalize(cwd, path) {
            Normalized::Path(p) => Ok(p),
            Normalized::Escaped(_) => Err(VfsError::SandboxViolation(path.to_string())),
        }
    }

    fn normalize(&self, cwd: &str, path: &str) -> Normalized {
        let trimmed = path.trim_end_matches(SEPARATOR);
        if trimmed.is_empty() && !path.is_empty() {
            return Normalized::Path(ROOT.to_string());
        }
        let folded = self.fold(trimmed);

        let mut stack: Vec<&str> = if folded.starts_with(SEPARATOR) {
            Vec::new()
        } else {
            segments(cwd).collect()
        };
        let mut escaped = false;
        for segment in folded.split(SEPARATOR) {
            match segment {
                "" | "." => {}
                ".." => {
                    if stack.pop().is_none() {
                        escaped = true;
                    }
                }
                name => stack.push(name),
            }
        }

        let joined = join_segments(&stack);
        if escaped {
            Normalized::Escaped(joined)
        } else {
            Normalized::Path(joined)
        }
    }
}

enum Normalized {
    Path(String),
    Escaped(String),
}

/// A path names a file syntactically when it is non-empty and has no trailing
/// separator.
pub fn is_file_shaped(path: &str) -> bool {
    !path.is_empty() && !path.ends_with(SEPARATOR)
}

/// Non-empty segments of a canonical path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

fn join_segments(segments: &[&str]) -> String {
    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    out
}

/// Appends `name` to the canonical directory `dir`.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Splits a canonical path into its parent directory and final segment.
/// Returns `None` for the root.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once(SEPARATOR)?;
    if name.is_empty() {
        return None;
    }
    Some((if parent.is_empty() { ROOT } else { parent }, name))
}

/// Whether canonical `path` equals `ancestor` or lies beneath it, compared
/// segment by segment.
pub fn is_within(ancestor: &str, path: &str) -> bool {
    let mut inner = segments(path);
    segments(ancestor).all(|segment| inner.next() == Some(segment))
}

/// Whether host `path` lies inside `root`, by path components rather than
/// string prefix.
pub fn is_contained(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

/// Maps a canonical sandbox path onto the host below `root`.
///
/// `root` must already be canonical. The deepest existing ancestor of the
/// result is resolved through symlinks and must stay inside `root`.
pub fn host_path(root: &Path, canonical: &str) -> VfsResult<PathBuf> {
    let violation = || VfsError::SandboxViolation(canonical.to_string());

    let mut host = root.to_path_buf();
    for segment in segments(canonical) {
        if segment == ".." || segment == "." {
            return Err(violation());
        }
        host.push(segment);
    }

    let mut existing = host.as_path();
    while fs::symlink_metadata(existing).is_err() {
        existing = match existing.parent() {
            Some(parent) => parent,
            None => break,
        };
    }
    let real = existing.canonicalize().map_err(|_| violation())?;
    let rest = host.strip_prefix(existing).unwrap_or(Path::new(""));
    let resolved = real.join(rest);

    if is_contained(root, &resolved) {
        Ok(host)
    } else {
        Err(violation())
    }
}
