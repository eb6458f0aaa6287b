use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum VfsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("path escapes the sandbox: {0}")]
    SandboxViolation(String),

    #[error("invalid glob pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("unsupported encoding {0:?}, only utf-8 is supported")]
    UnsupportedEncoding(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // std::io::Error is stringified so it works with Serialize/Deserialize
    #[error("unable to {op} {path:?}: {message}")]
    Io {
        op: String,
        path: String,
        message: String,
    },

    #[error("background task failed: {0}")]
    Worker(String),
}

impl VfsError {
    /// Wraps a host I/O failure with the operation and the caller's path.
    ///
    /// A host "not found" keeps its meaning so both backends report the same
    /// error kind for a missing path.
    pub fn host(op: &str, path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(path.to_string()),
            _ => VfsError::Io {
                op: op.to_string(),
                path: path.to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(e: std::io::Error) -> Self {
        VfsError::Io {
            op: "access".into(),
            path: String::new(),
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for VfsError {
    fn from(e: tokio::task::JoinError) -> Self {
        VfsError::Worker(e.to_string())
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
