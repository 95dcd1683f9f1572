//! Object types stored in a repository.
//!
//! Structural objects (commits and trees) are stored as canonical JSON
//! (RFC 8785) and addressed by the hash of their stored bytes. Blobs are
//! stored raw and addressed by the hash of a `blob <len>\0` header followed
//! by their bytes, so a blob can never share an id with a structural object
//! of identical content.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Length in bytes of an object id.
pub const OBJECT_ID_LEN: usize = 20;

// =============================================================================
// ObjectId
// =============================================================================

/// A 20-byte content hash identifying a stored object.
///
/// The canonical textual form is 40 lowercase hexadecimal digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Create an object id from raw bytes.
    pub fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        ObjectId(bytes)
    }

    /// The raw bytes of this id.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Render this id as 40 lowercase hexadecimal digits.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The all-zero id, never produced by hashing.
    pub fn zero() -> Self {
        ObjectId([0u8; OBJECT_ID_LEN])
    }
}

impl FromStr for ObjectId {
    type Err = ObjectError;

    /// Parse exactly 40 lowercase hexadecimal digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != OBJECT_ID_LEN * 2 {
            return Err(ObjectError::InvalidId {
                reason: format!("expected {} hex digits, got {}", OBJECT_ID_LEN * 2, s.len()),
            });
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(ObjectError::InvalidId {
                reason: "uppercase hex digits are not accepted".to_string(),
            });
        }
        let decoded = hex::decode(s).map_err(|e| ObjectError::InvalidId {
            reason: e.to_string(),
        })?;
        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(ObjectId(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// FileMode
// =============================================================================

/// The mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    /// A subdirectory.
    Tree,
    /// A regular, non-executable file.
    RegularFile,
    /// An executable file.
    ExecutableFile,
    /// A symbolic link; the entry's blob holds the target path.
    Symlink,
    /// A submodule pointer; a leaf that can be neither read nor descended.
    Gitlink,
}

impl FileMode {
    /// Whether this mode designates a directory.
    pub fn is_tree(&self) -> bool {
        matches!(self, FileMode::Tree)
    }

    /// Whether this mode designates a regular or executable file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileMode::RegularFile | FileMode::ExecutableFile)
    }

    /// Whether this mode designates a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileMode::Symlink)
    }

    /// Whether this mode designates a submodule pointer.
    pub fn is_gitlink(&self) -> bool {
        matches!(self, FileMode::Gitlink)
    }
}

// =============================================================================
// Tree
// =============================================================================

/// An entry in a tree: a name bound to an object id and a mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Name of the entry within its directory.
    pub name: String,
    /// Object id of the entry.
    pub id: ObjectId,
    /// Mode of the entry.
    pub mode: FileMode,
}

/// A directory: an ordered list of named entries.
///
/// Entries are strictly ordered by name with no duplicates; names contain no
/// `/` and are never empty. [`Tree::validate`] checks these invariants and
/// the stores enforce them when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Tree {
    /// The entries, sorted by name.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree from entries, sorting them by name.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Result<Self, ObjectError> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let tree = Tree { entries };
        tree.validate()?;
        Ok(tree)
    }

    /// Find a direct child by name using binary search.
    pub fn find(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Check the ordering and naming invariants.
    pub fn validate(&self) -> Result<(), ObjectError> {
        for entry in &self.entries {
            if entry.name.is_empty() {
                return Err(ObjectError::InvalidTree {
                    reason: "empty entry name".to_string(),
                });
            }
            if entry.name.contains('/') {
                return Err(ObjectError::InvalidTree {
                    reason: format!("entry name contains '/': {}", entry.name),
                });
            }
        }
        for pair in self.entries.windows(2) {
            if pair[0].name >= pair[1].name {
                return Err(ObjectError::InvalidTree {
                    reason: format!(
                        "entries out of order: {} then {}",
                        pair[0].name, pair[1].name
                    ),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Commit
// =============================================================================

/// Identity and timestamp of a commit participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Person name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Zoned timestamp, serialized as RFC 3339.
    pub when: DateTime<FixedOffset>,
}

/// A commit pointing at a root tree and an ordered list of parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Object id of the root tree of this commit.
    pub tree: ObjectId,
    /// Parent commit ids, ordered; empty for an initial commit.
    pub parents: Vec<ObjectId>,
    /// Author of the changes.
    pub author: Signature,
    /// Person who created the commit.
    pub committer: Signature,
    /// Commit message.
    pub message: String,
}

// =============================================================================
// StoredObject
// =============================================================================

/// A structural object as stored: a commit or a tree, with a type tag.
///
/// Blobs are not wrapped; they are stored as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoredObject {
    /// A commit object.
    Commit(Commit),
    /// A tree object.
    Tree(Tree),
}

impl StoredObject {
    /// The type name of this object as it appears in JSON.
    pub fn type_name(&self) -> &'static str {
        match self {
            StoredObject::Commit(_) => "Commit",
            StoredObject::Tree(_) => "Tree",
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Error type for object model operations.
#[derive(Debug)]
pub enum ObjectError {
    /// An object id was not 40 lowercase hex digits.
    InvalidId { reason: String },
    /// A tree violated the ordering or naming invariants.
    InvalidTree { reason: String },
    /// JSON serialization or deserialization failed.
    Json(String),
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectError::InvalidId { reason } => write!(f, "invalid object id: {}", reason),
            ObjectError::InvalidTree { reason } => write!(f, "invalid tree: {}", reason),
            ObjectError::Json(msg) => write!(f, "JSON error: {}", msg),
        }
    }
}

impl std::error::Error for ObjectError {}

// =============================================================================
// Serialization and content addressing
// =============================================================================

/// Serialize a structural object to canonical JSON (RFC 8785).
pub fn to_canonical_json(object: &StoredObject) -> Result<Vec<u8>, ObjectError> {
    serde_json_canonicalizer::to_vec(object).map_err(|e| ObjectError::Json(e.to_string()))
}

/// Deserialize a structural object from JSON bytes.
pub fn from_json(json: &[u8]) -> Result<StoredObject, ObjectError> {
    serde_json::from_slice(json).map_err(|e| ObjectError::Json(e.to_string()))
}

/// Compute the id of a structural object from its canonical JSON bytes.
pub fn structured_object_id(canonical_json: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(canonical_json);
    finish(hasher)
}

/// Compute the id of a blob from its raw bytes.
pub fn blob_object_id(data: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", data.len()).as_bytes());
    hasher.update(data);
    finish(hasher)
}

fn finish(hasher: Sha1) -> ObjectId {
    let digest = hasher.finalize();
    let mut bytes = [0u8; OBJECT_ID_LEN];
    bytes.copy_from_slice(&digest);
    ObjectId(bytes)
}
