//! Core types shared by every backend: directory entries and encodings.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};

/// Enum for distinguishing entry types at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Dir,
    Symlink,
}

/// Metadata record returned by `read_dir` and `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    /// Serialized as milliseconds since the Unix epoch.
    #[serde(with = "serde_millis")]
    pub modified: SystemTime,
}

impl DirEntry {
    pub fn file(name: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            size,
            is_file: true,
            is_directory: false,
            is_symlink: false,
            modified,
        }
    }

    pub fn dir(name: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            size,
            is_file: false,
            is_directory: true,
            is_symlink: false,
            modified,
        }
    }

    pub fn file_type(&self) -> FileType {
        if self.is_symlink {
            FileType::Symlink
        } else if self.is_directory {
            FileType::Dir
        } else {
            FileType::File
        }
    }
}

/// Text encodings accepted by `read_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Utf8,
}

impl Encoding {
    /// Parses an encoding token. Only `utf8` and `utf-8` are accepted, in any
    /// ASCII case.
    pub fn parse(token: &str) -> VfsResult<Self> {
        if token.eq_ignore_ascii_case("utf8") || token.eq_ignore_ascii_case("utf-8") {
            Ok(Encoding::Utf8)
        } else {
            Err(VfsError::UnsupportedEncoding(token.to_string()))
        }
    }
}
