use async_trait::async_trait;
use bytes::Bytes;

use crate::repository::{Commit, ObjectError, ObjectId, Tree};

/// Error type for object-store operations.
#[derive(Debug)]
pub enum StoreError {
    /// The object or ref was not found.
    NotFound,
    /// The object exists but has an unexpected type.
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// The stored bytes could not be decoded.
    Corrupt(String),
    /// An I/O error occurred.
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "not found"),
            StoreError::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {}, got {}", expected, actual)
            }
            StoreError::Corrupt(reason) => write!(f, "corrupt object: {}", reason),
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound
        } else {
            StoreError::Io(e)
        }
    }
}

impl From<ObjectError> for StoreError {
    fn from(e: ObjectError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Result type for object-store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-only access to a repository's object database and refs.
///
/// All operations are asynchronous. Implementations store objects identified
/// by their content hash and name commits through direct refs. Symbolic refs
/// are outside this contract; `refs` and `resolve_ref` deal in direct refs
/// only.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a blob's bytes by id.
    ///
    /// Returns `StoreError::TypeMismatch` if the id names a structural
    /// object, `StoreError::NotFound` if it names nothing.
    async fn read_blob(&self, id: &ObjectId) -> StoreResult<Bytes>;

    /// Parse a commit object by id.
    async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit>;

    /// Parse a tree object by id. Entries are ordered by name.
    async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree>;

    /// The stored size in bytes of the object with the given id, whatever
    /// its type.
    async fn object_size(&self, id: &ObjectId) -> StoreResult<u64>;

    /// Enumerate direct refs whose name starts with the given prefix,
    /// sorted by name.
    async fn refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>>;

    /// Resolve a direct ref to the object id it points at, or `None` if the
    /// ref does not exist.
    async fn resolve_ref(&self, name: &str) -> StoreResult<Option<ObjectId>>;
}
