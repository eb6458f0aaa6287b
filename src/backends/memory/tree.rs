//! Arena-backed directory tree with size and mtime bookkeeping.
//!
//! Directories live in slots of one arena and refer to each other by
//! [`DirId`]. A directory owns its children (through the ids in its
//! `children` map) and its files; the `parent` id is a plain back-reference
//! used to rebuild paths and to push size and mtime changes upward.
//!
//! Every mutation keeps two invariants: a directory's `size` is the sum of all
//! file sizes beneath it, and its `mtime` is no older than any change applied
//! at or below it.

use std::collections::BTreeMap;
use std::time::SystemTime;

use super::node::{DirId, DirNode, FileNode};
use crate::error::{VfsError, VfsResult};
use crate::path;

/// Result of walking a canonical path through the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Location {
    Dir(DirId),
    File { parent: DirId, name: String },
    /// Only the final segment is missing and its parent exists.
    Vacant { parent: DirId, name: String },
    Missing,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<DirNode>,
}

#[derive(Debug)]
pub(super) struct Tree {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Tree {
    pub fn new(now: SystemTime) -> Self {
        Self {
            slots: vec![Slot {
                generation: DirId::ROOT.generation,
                node: Some(DirNode::new("", None, now)),
            }],
            free: Vec::new(),
        }
    }

    pub fn get(&self, id: DirId) -> Option<&DirNode> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn contains(&self, id: DirId) -> bool {
        self.get(id).is_some()
    }

    /// Live directory lookup. Ids held by the tree itself are always live.
    pub fn dir(&self, id: DirId) -> &DirNode {
        self.get(id).expect("directory id refers to a released slot")
    }

    fn dir_mut(&mut self, id: DirId) -> &mut DirNode {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .expect("directory id refers to a released slot")
    }

    pub fn file(&self, parent: DirId, name: &str) -> Option<&FileNode> {
        self.dir(parent).files.get(name)
    }

    fn alloc(&mut self, node: DirNode) -> DirId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            DirId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            DirId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    pub fn full_path(&self, id: DirId) -> String {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.dir(current);
            if node.parent.is_some() {
                names.push(node.name.as_str());
            }
            cursor = node.parent;
        }
        if names.is_empty() {
            return path::ROOT.to_string();
        }
        names.reverse();
        let mut out = String::new();
        for name in names {
            out.push(path::SEPARATOR);
            out.push_str(name);
        }
        out
    }

    pub fn file_path(&self, parent: DirId, name: &str) -> String {
        path::join(&self.full_path(parent), name)
    }

    /// Walks a canonical path from the root.
    ///
    /// Files are not traversable: a file matching a non-final segment is a
    /// miss. With `allow_vacant`, a missing final segment under an existing
    /// directory yields [`Location::Vacant`].
    pub fn locate(&self, canonical: &str, allow_vacant: bool) -> Location {
        let segments: Vec<&str> = path::segments(canonical).collect();
        let mut node = DirId::ROOT;
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let dir = self.dir(node);
            if let Some(&child) = dir.children.get(*segment) {
                node = child;
                continue;
            }
            if dir.files.contains_key(*segment) {
                return if last {
                    Location::File {
                        parent: node,
                        name: segment.to_string(),
                    }
                } else {
                    Location::Missing
                };
            }
            if last && allow_vacant {
                return Location::Vacant {
                    parent: node,
                    name: segment.to_string(),
                };
            }
            return Location::Missing;
        }
        Location::Dir(node)
    }

    /// Applies a size delta and a modification time to `id` and every
    /// ancestor.
    pub fn propagate(&mut self, id: DirId, delta: i64, now: SystemTime) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.dir_mut(current);
            node.size = node.size.saturating_add_signed(delta);
            if now > node.mtime {
                node.mtime = now;
            }
            cursor = node.parent;
        }
    }

    /// Creates an empty directory `name` under `parent`.
    pub fn create_dir(&mut self, parent: DirId, name: &str, now: SystemTime) -> DirId {
        let id = self.alloc(DirNode::new(name, Some(parent), now));
        self.dir_mut(parent).children.insert(name.to_string(), id);
        self.propagate(parent, 0, now);
        id
    }

    /// Creates every missing directory along a canonical path and returns the
    /// last one.
    pub fn mkdir_all(&mut self, canonical: &str, now: SystemTime) -> VfsResult<DirId> {
        let mut node = DirId::ROOT;
        for segment in path::segments(canonical) {
            let existing = self.dir(node).children.get(segment).copied();
            node = match existing {
                Some(child) => child,
                None if self.dir(node).files.contains_key(segment) => {
                    return Err(VfsError::NotADirectory(self.file_path(node, segment)));
                }
                None => self.create_dir(node, segment, now),
            };
        }
        Ok(node)
    }

    /// Stores `file` in `parent`, overwriting the content of a same-named
    /// file. A same-named directory is replaced.
    pub fn put_file(&mut self, parent: DirId, mut file: FileNode, now: SystemTime) {
        let shadowed = self.dir(parent).children.get(&file.name).copied();
        if let Some(dir) = shadowed {
            self.remove_dir(dir, now);
        }
        file.parent = parent;
        let delta = match self.dir_mut(parent).files.get_mut(&file.name) {
            Some(existing) => {
                let delta = file.size() as i64 - existing.size() as i64;
                existing.content = file.content;
                existing.mtime = existing.mtime.max(now);
                delta
            }
            None => {
                let size = file.size() as i64;
                self.dir_mut(parent).files.insert(file.name.clone(), file);
                size
            }
        };
        self.propagate(parent, delta, now);
    }

    pub fn remove_file(&mut self, parent: DirId, name: &str, now: SystemTime) -> Option<FileNode> {
        let file = self.dir_mut(parent).files.remove(name)?;
        self.propagate(parent, -(file.size() as i64), now);
        Some(file)
    }

    /// Unlinks `id` from its parent, leaving a parentless subtree that is
    /// still allocated.
    pub fn detach(&mut self, id: DirId, now: SystemTime) {
        let (parent, name, size) = {
            let node = self.dir(id);
            (node.parent, node.name.clone(), node.size)
        };
        let Some(parent) = parent else {
            return;
        };
        self.dir_mut(parent).children.remove(&name);
        self.propagate(parent, -(size as i64), now);
        self.dir_mut(id).parent = None;
    }

    /// Frees a detached subtree.
    pub fn release(&mut self, id: DirId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self
                .slots
                .get_mut(current.index)
                .filter(|slot| slot.generation == current.generation)
            else {
                continue;
            };
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                stack.extend(node.children.into_values());
            }
        }
    }

    pub fn remove_dir(&mut self, id: DirId, now: SystemTime) {
        self.detach(id, now);
        self.release(id);
    }

    /// Drops every child and file of `id`, keeping the directory itself.
    pub fn clear(&mut self, id: DirId, now: SystemTime) {
        let (children, size) = {
            let node = self.dir_mut(id);
            node.files.clear();
            (std::mem::take(&mut node.children), node.size)
        };
        for child in children.into_values() {
            self.dir_mut(child).parent = None;
            self.release(child);
        }
        self.propagate(id, -(size as i64), now);
    }

    /// Clones the subtree at `id` into fresh, parentless nodes that all carry
    /// the modification time `now`.
    pub fn deep_copy(&mut self, id: DirId, now: SystemTime) -> DirId {
        let source = self.dir(id).clone();
        let mut copy = DirNode::new(source.name, None, now);
        copy.size = source.size;
        copy.files = source
            .files
            .into_iter()
            .map(|(name, mut file)| {
                file.mtime = now;
                (name, file)
            })
            .collect();
        let copy_id = self.alloc(copy);
        for file in self.dir_mut(copy_id).files.values_mut() {
            file.parent = copy_id;
        }

        for (name, child) in source.children {
            let child_copy = self.deep_copy(child, now);
            self.dir_mut(child_copy).parent = Some(copy_id);
            self.dir_mut(copy_id).children.insert(name, child_copy);
        }
        copy_id
    }

    /// Moves the contents of the detached directory `src` into `dest`.
    ///
    /// Same-named directories are merged recursively and colliding files are
    /// overwritten. Non-colliding subtrees are re-parented, not copied. `src`
    /// is left empty and still allocated; the caller releases it.
    pub fn merge(&mut self, dest: DirId, src: DirId, now: SystemTime) {
        let (children, files) = {
            let node = self.dir_mut(src);
            node.size = 0;
            (
                std::mem::take(&mut node.children),
                std::mem::take(&mut node.files),
            )
        };

        for (name, child) in children {
            let existing = self.dir(dest).children.get(&name).copied();
            match existing {
                Some(target) => {
                    self.dir_mut(child).parent = None;
                    self.merge(target, child, now);
                    self.release(child);
                }
                None => {
                    if self.dir(dest).files.contains_key(&name) {
                        self.remove_file(dest, &name, now);
                    }
                    self.attach(dest, name, child, now);
                }
            }
        }

        for file in files.into_values() {
            self.put_file(dest, file, now);
        }
    }

    fn attach(&mut self, parent: DirId, name: String, child: DirId, now: SystemTime) {
        let size = {
            let node = self.dir_mut(child);
            node.parent = Some(parent);
            node.name = name.clone();
            node.size
        };
        self.dir_mut(parent).children.insert(name, child);
        self.propagate(parent, size as i64, now);
    }

    /// Path of every node mapped to its content (`None` for directories).
    pub fn snapshot(&self) -> BTreeMap<String, Option<String>> {
        let mut out = BTreeMap::new();
        let mut stack = vec![DirId::ROOT];
        while let Some(id) = stack.pop() {
            let path = self.full_path(id);
            let node = self.dir(id);
            for file in node.files.values() {
                out.insert(path::join(&path, &file.name), Some(file.content.clone()));
            }
            stack.extend(node.children.values().copied());
            out.insert(path, None);
        }
        out
    }

    /// Recomputes sizes and parent links, panicking on any mismatch.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        fn check(tree: &Tree, id: DirId) -> u64 {
            let node = tree.dir(id);
            let mut total = 0;
            for file in node.files.values() {
                assert_eq!(file.parent, id, "file {} has a stale parent", file.name);
                total += file.size();
            }
            for (name, &child) in &node.children {
                let child_node = tree.dir(child);
                assert_eq!(child_node.parent, Some(id), "dir {} has a stale parent", name);
                assert_eq!(&child_node.name, name);
                assert!(child_node.mtime <= node.mtime, "dir {} is newer than its parent", name);
                total += check(tree, child);
            }
            assert_eq!(node.size, total, "size of {} is out of date", tree.full_path(id));
            total
        }
        check(self, DirId::ROOT);

        let live = self.slots.iter().filter(|slot| slot.node.is_some()).count();
        let mut reachable = 0;
        let mut stack = vec![DirId::ROOT];
        while let Some(id) = stack.pop() {
            reachable += 1;
            stack.extend(self.dir(id).children.values().copied());
        }
        assert_eq!(live, reachable, "released subtrees leaked arena slots");
    }
}
