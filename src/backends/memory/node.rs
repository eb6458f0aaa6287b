//! Internal node representation for the in-memory filesystem.

use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::types::DirEntry;

/// Handle to a directory slot in the [`Tree`](super::tree::Tree) arena.
///
/// The generation makes handles to released directories detectably stale,
/// even after their slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct DirId {
    pub index: usize,
    pub generation: u32,
}

impl DirId {
    pub const ROOT: DirId = DirId {
        index: 0,
        generation: 0,
    };
}

#[derive(Debug, Clone)]
pub(super) struct FileNode {
    pub name: String,
    pub parent: DirId,
    pub content: String,
    pub mtime: SystemTime,
}

impl FileNode {
    pub fn new(name: impl Into<String>, parent: DirId, content: String, mtime: SystemTime) -> Self {
        Self {
            name: name.into(),
            parent,
            content,
            mtime,
        }
    }

    /// Size in bytes of the UTF-8 content.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn entry(&self) -> DirEntry {
        DirEntry::file(self.name.clone(), self.size(), self.mtime)
    }
}

#[derive(Debug, Clone)]
pub(super) struct DirNode {
    pub name: String,
    /// Back-reference only; never keeps the parent alive.
    pub parent: Option<DirId>,
    pub children: BTreeMap<String, DirId>,
    pub files: BTreeMap<String, FileNode>,
    /// Sum of the sizes of every file below this directory.
    pub size: u64,
    pub mtime: SystemTime,
}

impl DirNode {
    pub fn new(name: impl Into<String>, parent: Option<DirId>, mtime: SystemTime) -> Self {
        Self {
            name: name.into(),
            parent,
            children: BTreeMap::new(),
            files: BTreeMap::new(),
            size: 0,
            mtime,
        }
    }

    pub fn entry(&self) -> DirEntry {
        let name = if self.parent.is_none() && self.name.is_empty() {
            crate::path::ROOT.to_string()
        } else {
            self.name.clone()
        };
        DirEntry::dir(name, self.size, self.mtime)
    }
}
