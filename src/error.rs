//! Error types for the git file-system surface.
//!
//! Deep internals (the tree resolver, the object stores) return small
//! context-free errors; the file-system surface converts them into
//! [`GitFsError`] values decorated with the path string the caller supplied.

use thiserror::Error;

use crate::backend::StoreError;

/// Result type alias using [`GitFsError`].
pub type Result<T> = std::result::Result<T, GitFsError>;

/// Errors surfaced by file-system operations.
#[derive(Debug, Error)]
pub enum GitFsError {
    /// Syntactic parse failure of a path or URI.
    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    /// A named path does not exist in a commit tree.
    #[error("no such file: {path}")]
    NoSuchFile { path: String },

    /// Attempt to descend into a non-tree object.
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// Attempt to open a tree as a byte channel.
    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    /// Attempt to read the link target of a non-symlink.
    #[error("not a symbolic link: {path}")]
    NotALink { path: String },

    /// A symlink target starts with `/`. Carries the raw target string.
    #[error("absolute link target: {target}")]
    AbsoluteLink { target: String },

    /// Existence could not be determined because a symlink must be crossed
    /// while link following is disabled, or a link target is absolute.
    #[error("path could not be found: {path}: {reason}")]
    PathCouldNotBeFound { path: String, reason: String },

    /// Any write attempt.
    #[error("read-only file system")]
    ReadOnlyFileSystem,

    /// Operation on a closed file-system instance.
    #[error("file system is closed")]
    ClosedFileSystem,

    /// A file system is already registered under the given key.
    #[error("file system already exists: {key}")]
    AlreadyExists { key: String },

    /// No live file system is registered under the given key.
    #[error("file system not found: {key}")]
    FileSystemNotFound { key: String },

    /// Execute access requested on a non-executable entry.
    #[error("access denied: {path}")]
    AccessDenied { path: String },

    /// Non-applicable file-system API.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },

    /// API contract violation, such as requesting a second iterator from a
    /// directory stream.
    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    /// Argument mismatch, such as relativizing across root kinds or mixing
    /// paths from different file systems.
    #[error("illegal argument: {reason}")]
    IllegalArgument { reason: String },

    /// Underlying object-store failure.
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
}

impl GitFsError {
    /// Create an InvalidPath error.
    pub fn invalid_path(reason: impl Into<String>) -> Self {
        GitFsError::InvalidPath {
            reason: reason.into(),
        }
    }

    /// Create a NoSuchFile error.
    pub fn no_such_file(path: impl Into<String>) -> Self {
        GitFsError::NoSuchFile { path: path.into() }
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        GitFsError::NotADirectory { path: path.into() }
    }

    /// Create a PathCouldNotBeFound error.
    pub fn path_could_not_be_found(path: impl Into<String>, reason: impl Into<String>) -> Self {
        GitFsError::PathCouldNotBeFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an IllegalState error.
    pub fn illegal_state(reason: impl Into<String>) -> Self {
        GitFsError::IllegalState {
            reason: reason.into(),
        }
    }

    /// Create an IllegalArgument error.
    pub fn illegal_argument(reason: impl Into<String>) -> Self {
        GitFsError::IllegalArgument {
            reason: reason.into(),
        }
    }
}
