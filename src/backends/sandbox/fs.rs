//! Core SandboxFs implementation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::backend::FileSystem;
use crate::error::{VfsError, VfsResult};
use crate::path::{self, PathResolver, ROOT};
use crate::pattern::{self, Listing, Searchable};
use crate::types::{DirEntry, Encoding};

/// Host filesystem view confined to one root directory.
///
/// Paths seen by callers are sandbox paths: `/` is the root directory, and
/// host paths never appear in results.
#[derive(Debug, Clone)]
pub struct SandboxFs {
    root: PathBuf,
    current: String,
    resolver: PathResolver,
}

impl SandboxFs {
    /// Opens a sandbox over the existing directory `root`.
    ///
    /// `case_sensitive` should describe the host filesystem. When it is false,
    /// paths are lower-cased like the in-memory backend does and the host
    /// folds the rest.
    pub fn new(root: impl AsRef<Path>, case_sensitive: bool) -> VfsResult<Self> {
        let shown = root.as_ref().display().to_string();
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| VfsError::host("open sandbox root", &shown, e))?;
        if !root.is_dir() {
            return Err(VfsError::NotADirectory(shown));
        }
        debug!(root = %root.display(), case_sensitive, "open sandbox");
        Ok(Self {
            root,
            current: ROOT.to_string(),
            resolver: PathResolver::new(case_sensitive),
        })
    }

    /// Canonical host directory backing `/`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a caller path to its sandbox path and host path.
    fn locate(&self, path: &str) -> VfsResult<(String, PathBuf)> {
        let located = self
            .resolver
            .resolve_contained(&self.current, path)
            .and_then(|canonical| {
                let host = path::host_path(&self.root, &canonical)?;
                Ok((canonical, host))
            });
        if let Err(VfsError::SandboxViolation(_)) = &located {
            warn!(path, root = %self.root.display(), "path escapes the sandbox");
        }
        located
    }

    fn transfer(&mut self, src: &str, dest: &str, remove_source: bool) -> VfsResult<()> {
        let op = if remove_source { "move" } else { "copy" };
        let src_is_dir_shaped = !path::is_file_shaped(src);
        let dest_is_dir_shaped = !path::is_file_shaped(dest);
        let (src, src_host) = self.locate(src)?;
        let (dest, dest_host) = self.locate(dest)?;

        let meta = fs::metadata(&src_host).map_err(|e| VfsError::host(op, &src, e))?;
        if meta.is_dir() {
            self.transfer_dir(&src, &src_host, &dest, &dest_host, remove_source)
        } else if src_is_dir_shaped {
            Err(VfsError::NotFound(src))
        } else {
            self.transfer_file(
                &src,
                &src_host,
                &dest,
                &dest_host,
                dest_is_dir_shaped,
                remove_source,
            )
        }
    }

    fn transfer_file(
        &self,
        src: &str,
        src_host: &Path,
        dest: &str,
        dest_host: &Path,
        dest_is_dir_shaped: bool,
        remove_source: bool,
    ) -> VfsResult<()> {
        let op = if remove_source { "move" } else { "copy" };
        let name = path::split_parent(src)
            .map(|(_, name)| name)
            .ok_or_else(|| VfsError::NotAFile(src.to_string()))?;

        let target = if dest_host.is_dir() {
            path::join(dest, name)
        } else if dest_host.is_file() {
            if dest_is_dir_shaped {
                return Err(VfsError::NotADirectory(dest.to_string()));
            }
            dest.to_string()
        } else if dest_is_dir_shaped {
            fs::create_dir_all(dest_host).map_err(|e| VfsError::host(op, dest, e))?;
            path::join(dest, name)
        } else {
            if let Some(parent) = dest_host.parent() {
                fs::create_dir_all(parent).map_err(|e| VfsError::host(op, dest, e))?;
            }
            dest.to_string()
        };
        let target_host = path::host_path(&self.root, &target)?;

        if target_host == src_host {
            return Ok(());
        }
        if target_host.is_dir() {
            let src_parent = path::split_parent(src).map_or(ROOT, |(parent, _)| parent);
            if path::is_within(&target, src_parent) {
                return Err(VfsError::InvalidArgument(format!(
                    "cannot replace {} with a file from inside it",
                    target
                )));
            }
            fs::remove_dir_all(&target_host).map_err(|e| VfsError::host(op, &target, e))?;
        }

        debug!(from = %src, to = %target, remove_source, "transfer file");
        if remove_source {
            fs::rename(src_host, &target_host).map_err(|e| VfsError::host(op, src, e))
        } else {
            fs::copy(src_host, &target_host)
                .map(|_| ())
                .map_err(|e| VfsError::host(op, src, e))
        }
    }

    fn transfer_dir(
        &self,
        src: &str,
        src_host: &Path,
        dest: &str,
        dest_host: &Path,
        remove_source: bool,
    ) -> VfsResult<()> {
        let op = if remove_source { "move" } else { "copy" };
        if dest_host.is_file() {
            return Err(VfsError::NotADirectory(dest.to_string()));
        }
        if src == dest {
            return Ok(());
        }
        if remove_source && path::is_within(src, dest) {
            return Err(VfsError::InvalidArgument(format!(
                "cannot move {} into itself at {}",
                src, dest
            )));
        }
        if let Some(replaced) = self.replaced_ancestor(src, src_host, dest) {
            return Err(VfsError::InvalidArgument(format!(
                "merging {} into {} would replace {} with a file",
                src, dest, replaced
            )));
        }

        debug!(from = %src, to = %dest, remove_source, "transfer directory");
        if remove_source && fs::symlink_metadata(dest_host).is_err() {
            if let Some(parent) = dest_host.parent() {
                fs::create_dir_all(parent).map_err(|e| VfsError::host(op, dest, e))?;
            }
            return fs::rename(src_host, dest_host).map_err(|e| VfsError::host(op, src, e));
        }

        self.merge_into(op, src, src_host, dest, dest_host)?;
        if remove_source {
            fs::remove_dir_all(src_host).map_err(|e| VfsError::host(op, src, e))?;
        }
        Ok(())
    }

    /// When `dest` is an ancestor of `src`, a merge walks back down the path
    /// to `src`. Returns the directory on that path a source file would
    /// replace, if any.
    fn replaced_ancestor(&self, src: &str, src_host: &Path, dest: &str) -> Option<String> {
        if src == dest || !path::is_within(dest, src) {
            return None;
        }
        let mut host = src_host.to_path_buf();
        let mut at = dest.to_string();
        for segment in path::segments(src).skip(path::segments(dest).count()) {
            at = path::join(&at, segment);
            host.push(segment);
            let meta = fs::symlink_metadata(&host).ok()?;
            if meta.is_file() {
                return Some(at);
            }
            if !meta.is_dir() {
                return None;
            }
        }
        None
    }

    /// Falls back to the root once the current directory is gone.
    fn repair_current(&mut self) {
        if !path::host_path(&self.root, &self.current).is_ok_and(|cwd| cwd.is_dir()) {
            self.current = ROOT.to_string();
        }
    }

    /// Copies everything below `src_host` into the sandbox directory `dest`,
    /// creating it if needed and overwriting colliding files.
    fn merge_into(
        &self,
        op: &str,
        src: &str,
        src_host: &Path,
        dest: &str,
        dest_host: &Path,
    ) -> VfsResult<()> {
        // Collected before the destination exists: it may lie inside the source.
        let entries = WalkDir::new(src_host)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| walk_error(op, src, e))?;
        fs::create_dir_all(dest_host).map_err(|e| VfsError::host(op, dest, e))?;

        for entry in entries {
            if entry.path_is_symlink() {
                debug!(path = %entry.path().display(), "skipping symlink");
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(src_host) else {
                continue;
            };
            let mut target = dest.to_string();
            for component in relative.components() {
                let Some(name) = component.as_os_str().to_str() else {
                    return Err(VfsError::InvalidArgument(format!(
                        "non UTF-8 name below {}",
                        src
                    )));
                };
                target = path::join(&target, name);
            }
            let target_host = path::host_path(&self.root, &target)?;

            if entry.file_type().is_dir() {
                if target_host.is_file() {
                    fs::remove_file(&target_host).map_err(|e| VfsError::host(op, &target, e))?;
                }
                fs::create_dir_all(&target_host).map_err(|e| VfsError::host(op, &target, e))?;
            } else {
                if target_host.is_dir() {
                    fs::remove_dir_all(&target_host)
                        .map_err(|e| VfsError::host(op, &target, e))?;
                }
                fs::copy(entry.path(), &target_host).map_err(|e| VfsError::host(op, &target, e))?;
            }
        }
        Ok(())
    }

    /// Entries directly inside `host`, sorted by name. Names that are not
    /// UTF-8 cannot be expressed as text paths and are skipped.
    fn children(
        &self,
        op: &str,
        shown: &str,
        host: &Path,
    ) -> VfsResult<Vec<(String, walkdir::DirEntry)>> {
        let mut children = Vec::new();
        for entry in WalkDir::new(host).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(op, shown, e))?;
            match entry.file_name().to_str() {
                Some(name) => children.push((name.to_string(), entry)),
                None => debug!(path = %entry.path().display(), "skipping non UTF-8 name"),
            }
        }
        Ok(children)
    }
}

fn walk_error(op: &str, path: &str, err: walkdir::Error) -> VfsError {
    let message = err.to_string();
    match err.into_io_error() {
        Some(io) => VfsError::host(op, path, io),
        None => VfsError::Io {
            op: op.to_string(),
            path: path.to_string(),
            message,
        },
    }
}

fn entry_for(name: &str, meta: &fs::Metadata) -> DirEntry {
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    DirEntry {
        name: name.to_string(),
        size: meta.len(),
        is_file: meta.is_file(),
        is_directory: meta.is_dir(),
        is_symlink: meta.file_type().is_symlink(),
        modified,
    }
}

fn clear_dir(shown: &str, host: &Path) -> VfsResult<()> {
    let entries = fs::read_dir(host).map_err(|e| VfsError::host("delete", shown, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VfsError::host("delete", shown, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| VfsError::host("delete", shown, e))?;
        let removed = if file_type.is_dir() {
            fs::remove_dir_all(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        removed.map_err(|e| VfsError::host("delete", shown, e))?;
    }
    Ok(())
}

impl FileSystem for SandboxFs {
    fn is_case_sensitive(&self) -> bool {
        !self.resolver.folds_case()
    }

    fn delete(&mut self, path: &str) -> VfsResult<()> {
        let (path, host) = self.locate(path)?;
        let meta = fs::symlink_metadata(&host).map_err(|e| VfsError::host("delete", &path, e))?;
        debug!(path = %path, "delete");
        if meta.is_dir() {
            if path == ROOT {
                clear_dir(&path, &host)?;
            } else {
                fs::remove_dir_all(&host).map_err(|e| VfsError::host("delete", &path, e))?;
            }
        } else {
            fs::remove_file(&host).map_err(|e| VfsError::host("delete", &path, e))?;
        }
        self.repair_current();
        Ok(())
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let (path, host) = self.locate(path)?;
        let meta = fs::metadata(&host).map_err(|e| VfsError::host("read dir", &path, e))?;
        if !meta.is_dir() {
            return Err(VfsError::NotADirectory(path));
        }
        let mut entries = Vec::new();
        for (name, entry) in self.children("read dir", &path, &host)? {
            let meta = entry
                .metadata()
                .map_err(|e| walk_error("read dir", &path, e))?;
            entries.push(entry_for(&name, &meta));
        }
        entries.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    fn stat(&self, path: &str) -> VfsResult<DirEntry> {
        let (path, host) = self.locate(path)?;
        let meta = fs::symlink_metadata(&host).map_err(|e| VfsError::host("stat", &path, e))?;
        let name = path::split_parent(&path).map_or(ROOT, |(_, name)| name);
        Ok(entry_for(name, &meta))
    }

    fn read_file(&self, path: &str, encoding: &str) -> VfsResult<String> {
        Encoding::parse(encoding)?;
        if !path::is_file_shaped(path) {
            return Err(VfsError::NotAFile(path.to_string()));
        }
        let (path, host) = self.locate(path)?;
        if host.is_dir() {
            return Err(VfsError::NotAFile(path));
        }
        fs::read_to_string(&host).map_err(|e| VfsError::host("read file", &path, e))
    }

    fn write_file(&mut self, path: &str, text: &str) -> VfsResult<()> {
        if !path::is_file_shaped(path) {
            return Err(VfsError::NotAFile(path.to_string()));
        }
        let (path, host) = self.locate(path)?;
        if host.is_dir() {
            return Err(VfsError::NotAFile(path));
        }
        if !host.parent().is_some_and(Path::is_dir) {
            let parent = path::split_parent(&path).map_or(ROOT, |(parent, _)| parent);
            return Err(VfsError::NotFound(parent.to_string()));
        }
        debug!(path = %path, bytes = text.len(), "write file");
        fs::write(&host, text).map_err(|e| VfsError::host("write file", &path, e))
    }

    fn mkdir(&mut self, path: &str) -> VfsResult<()> {
        let (path, host) = self.locate(path)?;
        let mut prefix = ROOT.to_string();
        let mut probe = self.root.clone();
        for segment in path::segments(&path) {
            prefix = path::join(&prefix, segment);
            probe.push(segment);
            if probe.is_file() {
                return Err(VfsError::NotADirectory(prefix));
            }
        }
        debug!(path = %path, "mkdir");
        fs::create_dir_all(&host).map_err(|e| VfsError::host("make dir", &path, e))
    }

    fn move_path(&mut self, src: &str, dest: &str) -> VfsResult<()> {
        self.transfer(src, dest, true)?;
        self.repair_current();
        Ok(())
    }

    fn copy_path(&mut self, src: &str, dest: &str) -> VfsResult<()> {
        // A file copied over a directory removes it.
        self.transfer(src, dest, false)?;
        self.repair_current();
        Ok(())
    }

    fn file_exists(&self, path: &str) -> VfsResult<bool> {
        if !path::is_file_shaped(path) {
            return Ok(false);
        }
        let (_, host) = self.locate(path)?;
        Ok(host.is_file())
    }

    fn directory_exists(&self, path: &str) -> VfsResult<bool> {
        let (_, host) = self.locate(path)?;
        Ok(host.is_dir())
    }

    fn realpath(&self, path: &str) -> VfsResult<String> {
        self.locate(path).map(|(path, _)| path)
    }

    fn current_directory(&self) -> VfsResult<String> {
        Ok(self.current.clone())
    }

    fn set_current_directory(&mut self, path: &str) -> VfsResult<()> {
        let (path, host) = self.locate(path)?;
        if host.is_dir() {
            self.current = path;
            Ok(())
        } else if host.exists() {
            Err(VfsError::NotADirectory(path))
        } else {
            Err(VfsError::NotFound(path))
        }
    }

    fn glob(&self, patterns: &[String]) -> VfsResult<Vec<String>> {
        let mut found = Vec::new();
        for pattern in patterns {
            let pattern = self.resolver.resolve_contained(&self.current, pattern)?;
            let fold_case = self.resolver.folds_case();
            found.extend(pattern::search(self, ROOT.to_string(), &pattern, fold_case)?);
        }
        Ok(found)
    }
}

/// Glob search walks sandbox paths; entries that resolve outside the root are
/// treated as absent. Results carry the case policy like every other path.
impl Searchable for SandboxFs {
    type Dir = String;

    fn child_dir(&self, dir: &String, name: &str) -> VfsResult<Option<String>> {
        let child = path::join(dir, name);
        Ok(path::host_path(&self.root, &child)
            .is_ok_and(|host| host.is_dir())
            .then_some(child))
    }

    fn child_file(&self, dir: &String, name: &str) -> VfsResult<Option<String>> {
        let child = path::join(dir, name);
        Ok(path::host_path(&self.root, &child)
            .is_ok_and(|host| host.is_file())
            .then_some(child))
    }

    fn list(&self, dir: &String) -> VfsResult<Listing<String>> {
        let Ok(host) = path::host_path(&self.root, dir) else {
            return Ok(Listing::default());
        };
        let mut listing = Listing::default();
        for (name, entry) in self.children("glob", dir, &host)? {
            let child = path::join(dir, &self.resolver.fold(&name));
            let file_type = entry.file_type();
            if file_type.is_dir() {
                listing.dirs.push((name, child));
            } else if file_type.is_file() {
                listing.files.push((name, child));
            }
        }
        Ok(listing)
    }
}
