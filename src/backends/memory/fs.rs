//! Core MemoryFs implementation.

use std::collections::BTreeMap;
use std::time::SystemTime;

use tracing::debug;

use crate::backend::FileSystem;
use crate::error::{VfsError, VfsResult};
use crate::path::{self, PathResolver};
use crate::pattern::{self, Listing, Searchable};
use crate::types::{DirEntry, Encoding};

use super::node::{DirId, FileNode};
use super::tree::{Location, Tree};

/// Volatile in-memory filesystem.
#[derive(Debug)]
pub struct MemoryFs {
    pub(super) tree: Tree,
    pub(super) current: DirId,
    resolver: PathResolver,
}

impl MemoryFs {
    /// Create a new in-memory filesystem holding only an empty root
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            tree: Tree::new(SystemTime::now()),
            current: DirId::ROOT,
            resolver: PathResolver::new(case_sensitive),
        }
    }

    /// Every path in the tree mapped to its content, `None` for directories.
    pub fn snapshot(&self) -> BTreeMap<String, Option<String>> {
        self.tree.snapshot()
    }

    fn resolve(&self, path: &str) -> String {
        self.resolver.resolve(&self.tree.full_path(self.current), path)
    }

    /// The current directory falls back to the root once its node is gone.
    fn repair_current(&mut self) {
        if !self.tree.contains(self.current) {
            self.current = DirId::ROOT;
        }
    }

    /// Shared implementation of copy and move.
    fn transfer(&mut self, src: &str, dest: &str, remove_source: bool) -> VfsResult<()> {
        let src_is_dir_shaped = !path::is_file_shaped(src);
        let dest_is_dir_shaped = !path::is_file_shaped(dest);
        let src = self.resolve(src);
        let dest = self.resolve(dest);
        let now = SystemTime::now();

        match self.tree.locate(&src, false) {
            Location::Missing | Location::Vacant { .. } => return Err(VfsError::NotFound(src)),
            Location::File { .. } if src_is_dir_shaped => return Err(VfsError::NotFound(src)),
            Location::File { parent, name } => {
                self.transfer_file(parent, &name, &dest, dest_is_dir_shaped, remove_source, now)?
            }
            Location::Dir(dir) => self.transfer_dir(dir, &src, &dest, remove_source, now)?,
        }
        // Overwrites may have released the current directory.
        self.repair_current();
        Ok(())
    }

    fn transfer_file(
        &mut self,
        src_parent: DirId,
        src_name: &str,
        dest: &str,
        dest_is_dir_shaped: bool,
        remove_source: bool,
        now: SystemTime,
    ) -> VfsResult<()> {
        let (target, target_name) = match self.tree.locate(dest, false) {
            Location::Dir(dir) => (dir, src_name.to_string()),
            Location::File { .. } if dest_is_dir_shaped => {
                return Err(VfsError::NotADirectory(dest.to_string()));
            }
            Location::File { parent, name } => (parent, name),
            Location::Missing | Location::Vacant { .. } if dest_is_dir_shaped => {
                (self.tree.mkdir_all(dest, now)?, src_name.to_string())
            }
            Location::Missing | Location::Vacant { .. } => {
                let (parent, name) = path::split_parent(dest)
                    .ok_or_else(|| VfsError::NotADirectory(dest.to_string()))?;
                (self.tree.mkdir_all(parent, now)?, name.to_string())
            }
        };

        if remove_source && target == src_parent && target_name == src_name {
            return Ok(());
        }
        if let Some(&shadowed) = self.tree.dir(target).children.get(&target_name) {
            let shadowed = self.tree.full_path(shadowed);
            if path::is_within(&shadowed, &self.tree.full_path(src_parent)) {
                return Err(VfsError::InvalidArgument(format!(
                    "cannot replace {} with a file from inside it",
                    shadowed
                )));
            }
        }

        let content = match self.tree.file(src_parent, src_name) {
            Some(file) => file.content.clone(),
            None => return Err(VfsError::NotFound(self.tree.file_path(src_parent, src_name))),
        };
        debug!(
            from = %self.tree.file_path(src_parent, src_name),
            to = %self.tree.file_path(target, &target_name),
            remove_source,
            "transfer file"
        );
        self.tree
            .put_file(target, FileNode::new(target_name, target, content, now), now);
        if remove_source {
            self.tree.remove_file(src_parent, src_name, now);
        }
        Ok(())
    }

    fn transfer_dir(
        &mut self,
        src_dir: DirId,
        src: &str,
        dest: &str,
        remove_source: bool,
        now: SystemTime,
    ) -> VfsResult<()> {
        if let Location::File { .. } = self.tree.locate(dest, false) {
            return Err(VfsError::NotADirectory(dest.to_string()));
        }
        if remove_source && src == dest {
            return Ok(());
        }
        if remove_source && path::is_within(src, dest) {
            return Err(VfsError::InvalidArgument(format!(
                "cannot move {} into itself at {}",
                src, dest
            )));
        }
        if let Some(replaced) = self.replaced_ancestor(src_dir, src, dest) {
            return Err(VfsError::InvalidArgument(format!(
                "merging {} into {} would replace {} with a file",
                src, dest, replaced
            )));
        }

        debug!(from = %src, to = %dest, remove_source, "transfer directory");
        if remove_source {
            let target = self.tree.mkdir_all(dest, now)?;
            self.tree.detach(src_dir, now);
            self.tree.merge(target, src_dir, now);
            self.tree.release(src_dir);
        } else {
            // Snapshot first so a destination inside the source is not copied
            // into itself.
            let copy = self.tree.deep_copy(src_dir, now);
            let target = match self.tree.mkdir_all(dest, now) {
                Ok(target) => target,
                Err(e) => {
                    self.tree.release(copy);
                    return Err(e);
                }
            };
            self.tree.merge(target, copy, now);
            self.tree.release(copy);
        }
        Ok(())
    }

    /// When `dest` is an ancestor of `src`, merging `src` into it walks back
    /// down the path to `src`. A source file sitting on that path would
    /// replace one of the directories holding `src`. Returns that directory.
    fn replaced_ancestor(&self, src_dir: DirId, src: &str, dest: &str) -> Option<String> {
        if src == dest || !path::is_within(dest, src) {
            return None;
        }
        let mut node = src_dir;
        let mut at = dest.to_string();
        for segment in path::segments(src).skip(path::segments(dest).count()) {
            at = path::join(&at, segment);
            if self.tree.file(node, segment).is_some() {
                return Some(at);
            }
            node = *self.tree.dir(node).children.get(segment)?;
        }
        None
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FileSystem for MemoryFs {
    fn is_case_sensitive(&self) -> bool {
        !self.resolver.folds_case()
    }

    fn delete(&mut self, path: &str) -> VfsResult<()> {
        let path = self.resolve(path);
        let now = SystemTime::now();
        match self.tree.locate(&path, false) {
            Location::File { parent, name } => {
                self.tree.remove_file(parent, &name, now);
            }
            Location::Dir(DirId::ROOT) => self.tree.clear(DirId::ROOT, now),
            Location::Dir(dir) => self.tree.remove_dir(dir, now),
            Location::Missing | Location::Vacant { .. } => return Err(VfsError::NotFound(path)),
        }
        debug!(path = %path, "delete");
        self.repair_current();
        Ok(())
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = self.resolve(path);
        match self.tree.locate(&path, false) {
            Location::Dir(dir) => {
                let node = self.tree.dir(dir);
                let dirs = node.children.values().map(|&child| self.tree.dir(child).entry());
                let files = node.files.values().map(FileNode::entry);
                Ok(dirs.chain(files).collect())
            }
            Location::File { .. } => Err(VfsError::NotADirectory(path)),
            Location::Missing | Location::Vacant { .. } => Err(VfsError::NotFound(path)),
        }
    }

    fn stat(&self, path: &str) -> VfsResult<DirEntry> {
        let path = self.resolve(path);
        match self.tree.locate(&path, false) {
            Location::Dir(dir) => Ok(self.tree.dir(dir).entry()),
            Location::File { parent, name } => self
                .tree
                .file(parent, &name)
                .map(FileNode::entry)
                .ok_or(VfsError::NotFound(path)),
            Location::Missing | Location::Vacant { .. } => Err(VfsError::NotFound(path)),
        }
    }

    fn read_file(&self, path: &str, encoding: &str) -> VfsResult<String> {
        Encoding::parse(encoding)?;
        if !path::is_file_shaped(path) {
            return Err(VfsError::NotAFile(path.to_string()));
        }
        let path = self.resolve(path);
        match self.tree.locate(&path, false) {
            Location::File { parent, name } => self
                .tree
                .file(parent, &name)
                .map(|file| file.content.clone())
                .ok_or(VfsError::NotFound(path)),
            Location::Dir(_) => Err(VfsError::NotAFile(path)),
            Location::Missing | Location::Vacant { .. } => Err(VfsError::NotFound(path)),
        }
    }

    fn write_file(&mut self, path: &str, text: &str) -> VfsResult<()> {
        if !path::is_file_shaped(path) {
            return Err(VfsError::NotAFile(path.to_string()));
        }
        let path = self.resolve(path);
        let (parent, name) = match self.tree.locate(&path, true) {
            Location::File { parent, name } | Location::Vacant { parent, name } => (parent, name),
            Location::Dir(_) => return Err(VfsError::NotAFile(path)),
            Location::Missing => {
                let parent = path::split_parent(&path).map_or(path::ROOT, |(parent, _)| parent);
                return Err(VfsError::NotFound(parent.to_string()));
            }
        };
        debug!(path = %path, bytes = text.len(), "write file");
        let now = SystemTime::now();
        self.tree
            .put_file(parent, FileNode::new(name, parent, text.to_string(), now), now);
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> VfsResult<()> {
        let path = self.resolve(path);
        debug!(path = %path, "mkdir");
        self.tree.mkdir_all(&path, SystemTime::now())?;
        Ok(())
    }

    fn move_path(&mut self, src: &str, dest: &str) -> VfsResult<()> {
        self.transfer(src, dest, true)
    }

    fn copy_path(&mut self, src: &str, dest: &str) -> VfsResult<()> {
        self.transfer(src, dest, false)
    }

    fn file_exists(&self, path: &str) -> VfsResult<bool> {
        if !path::is_file_shaped(path) {
            return Ok(false);
        }
        let path = self.resolve(path);
        Ok(matches!(self.tree.locate(&path, false), Location::File { .. }))
    }

    fn directory_exists(&self, path: &str) -> VfsResult<bool> {
        let path = self.resolve(path);
        Ok(matches!(self.tree.locate(&path, false), Location::Dir(_)))
    }

    fn realpath(&self, path: &str) -> VfsResult<String> {
        Ok(self.resolve(path))
    }

    fn current_directory(&self) -> VfsResult<String> {
        Ok(self.tree.full_path(self.current))
    }

    fn set_current_directory(&mut self, path: &str) -> VfsResult<()> {
        let path = self.resolve(path);
        match self.tree.locate(&path, false) {
            Location::Dir(dir) => {
                self.current = dir;
                Ok(())
            }
            Location::File { .. } => Err(VfsError::NotADirectory(path)),
            Location::Missing | Location::Vacant { .. } => Err(VfsError::NotFound(path)),
        }
    }

    fn glob(&self, patterns: &[String]) -> VfsResult<Vec<String>> {
        let mut found = Vec::new();
        for pattern in patterns {
            let pattern = self.resolve(pattern);
            let fold_case = self.resolver.folds_case();
            found.extend(pattern::search(&self.tree, DirId::ROOT, &pattern, fold_case)?);
        }
        Ok(found)
    }
}

impl Searchable for Tree {
    type Dir = DirId;

    fn child_dir(&self, dir: &DirId, name: &str) -> VfsResult<Option<DirId>> {
        Ok(self.dir(*dir).children.get(name).copied())
    }

    fn child_file(&self, dir: &DirId, name: &str) -> VfsResult<Option<String>> {
        Ok(self.file(*dir, name).map(|_| self.file_path(*dir, name)))
    }

    fn list(&self, dir: &DirId) -> VfsResult<Listing<DirId>> {
        let node = self.dir(*dir);
        let base = self.full_path(*dir);
        Ok(Listing {
            dirs: node
                .children
                .iter()
                .map(|(name, &child)| (name.clone(), child))
                .collect(),
            files: node
                .files
                .keys()
                .map(|name| (name.clone(), path::join(&base, name)))
                .collect(),
        })
    }
}
