//! In-memory object store and its builder.
//!
//! The builder is the write side: tests and in-memory (DFS) repositories
//! stage entries by slash-separated path, record commits and set refs, then
//! freeze the result into a read-only [`MemoryObjectStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;

use crate::path::GitRev;
use crate::repository::{
    blob_object_id, from_json, structured_object_id, to_canonical_json, Commit, FileMode,
    ObjectId, Signature, StoredObject, Tree, TreeEntry,
};

use super::object_store::{ObjectStore, StoreError, StoreResult};

/// What kind of bytes are stored under an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredKind {
    Blob,
    Commit,
    Tree,
}

impl StoredKind {
    fn name(self) -> &'static str {
        match self {
            StoredKind::Blob => "blob",
            StoredKind::Commit => "commit",
            StoredKind::Tree => "tree",
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    kind: StoredKind,
    bytes: Bytes,
}

/// An in-memory implementation of [`ObjectStore`].
///
/// Carries a descriptive repository name; the registry uses it as the DFS
/// authority key. An empty name is allowed.
pub struct MemoryObjectStore {
    name: String,
    objects: RwLock<HashMap<ObjectId, StoredEntry>>,
    refs: RwLock<BTreeMap<String, ObjectId>>,
}

impl MemoryObjectStore {
    /// The descriptive name of this repository.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point a direct ref at a new target, simulating an out-of-band ref
    /// update. Tooling and tests only; the file-system surface never writes.
    pub fn update_ref(&self, name: &str, id: ObjectId) -> Result<(), BuildError> {
        GitRev::validate_ref_name(name).map_err(|_| BuildError::InvalidRefName(name.to_string()))?;
        self.refs.write().unwrap().insert(name.to_string(), id);
        Ok(())
    }

    fn entry(&self, id: &ObjectId) -> StoreResult<StoredEntry> {
        let objects = self.objects.read().unwrap();
        objects.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn typed(&self, id: &ObjectId, expected: StoredKind) -> StoreResult<Bytes> {
        let entry = self.entry(id)?;
        if entry.kind != expected {
            return Err(StoreError::TypeMismatch {
                expected: expected.name(),
                actual: entry.kind.name(),
            });
        }
        Ok(entry.bytes)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn read_blob(&self, id: &ObjectId) -> StoreResult<Bytes> {
        self.typed(id, StoredKind::Blob)
    }

    async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        let bytes = self.typed(id, StoredKind::Commit)?;
        match from_json(&bytes)? {
            StoredObject::Commit(commit) => Ok(commit),
            other => Err(StoreError::TypeMismatch {
                expected: "commit",
                actual: other.type_name(),
            }),
        }
    }

    async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        let bytes = self.typed(id, StoredKind::Tree)?;
        match from_json(&bytes)? {
            StoredObject::Tree(tree) => {
                tree.validate()?;
                Ok(tree)
            }
            other => Err(StoreError::TypeMismatch {
                expected: "tree",
                actual: other.type_name(),
            }),
        }
    }

    async fn object_size(&self, id: &ObjectId) -> StoreResult<u64> {
        Ok(self.entry(id)?.bytes.len() as u64)
    }

    async fn refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>> {
        let refs = self.refs.read().unwrap();
        Ok(refs
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }

    async fn resolve_ref(&self, name: &str) -> StoreResult<Option<ObjectId>> {
        let refs = self.refs.read().unwrap();
        Ok(refs.get(name).copied())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Error type for staging operations on the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A staged path conflicts with an already staged entry.
    ConflictingPath(String),
    /// A staged path is empty or has an empty component.
    EmptyPath(String),
    /// A ref name is not a valid direct ref.
    InvalidRefName(String),
    /// Serialization of a staged object failed.
    Json(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ConflictingPath(path) => {
                write!(f, "path conflicts with an existing entry: {}", path)
            }
            BuildError::EmptyPath(path) => write!(f, "invalid staged path: {:?}", path),
            BuildError::InvalidRefName(name) => write!(f, "invalid ref name: {}", name),
            BuildError::Json(msg) => write!(f, "JSON error: {}", msg),
        }
    }
}

impl std::error::Error for BuildError {}

enum Staged {
    File { data: Bytes, executable: bool },
    Symlink(String),
    Gitlink(ObjectId),
    Dir(BTreeMap<String, Staged>),
}

/// Builder accumulating objects and refs for a [`MemoryObjectStore`].
pub struct MemoryStoreBuilder {
    name: String,
    objects: HashMap<ObjectId, StoredEntry>,
    refs: BTreeMap<String, ObjectId>,
}

impl MemoryStoreBuilder {
    /// Create a builder for a repository with the given descriptive name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: HashMap::new(),
            refs: BTreeMap::new(),
        }
    }

    /// Start recording a commit.
    pub fn commit(&mut self) -> CommitRecorder<'_> {
        CommitRecorder {
            builder: self,
            root: BTreeMap::new(),
            parents: vec![],
            author: default_signature(),
            committer: default_signature(),
            message: String::new(),
        }
    }

    /// Point a direct ref at an object id.
    pub fn set_ref(&mut self, name: &str, id: ObjectId) -> Result<(), BuildError> {
        GitRev::validate_ref_name(name).map_err(|_| BuildError::InvalidRefName(name.to_string()))?;
        self.refs.insert(name.to_string(), id);
        Ok(())
    }

    /// Freeze the builder into a read-only store.
    pub fn build(self) -> MemoryObjectStore {
        MemoryObjectStore {
            name: self.name,
            objects: RwLock::new(self.objects),
            refs: RwLock::new(self.refs),
        }
    }

    fn put_blob(&mut self, data: Bytes) -> ObjectId {
        let id = blob_object_id(&data);
        self.objects.insert(
            id,
            StoredEntry {
                kind: StoredKind::Blob,
                bytes: data,
            },
        );
        id
    }

    fn put_structured(&mut self, object: &StoredObject) -> Result<ObjectId, BuildError> {
        let json = to_canonical_json(object).map_err(|e| BuildError::Json(e.to_string()))?;
        let id = structured_object_id(&json);
        let kind = match object {
            StoredObject::Commit(_) => StoredKind::Commit,
            StoredObject::Tree(_) => StoredKind::Tree,
        };
        self.objects.insert(
            id,
            StoredEntry {
                kind,
                bytes: Bytes::from(json),
            },
        );
        Ok(id)
    }
}

/// Records one commit: staged entries, parents, signatures, message.
pub struct CommitRecorder<'a> {
    builder: &'a mut MemoryStoreBuilder,
    root: BTreeMap<String, Staged>,
    parents: Vec<ObjectId>,
    author: Signature,
    committer: Signature,
    message: String,
}

impl<'a> CommitRecorder<'a> {
    /// Stage a regular file at the given slash-separated path.
    pub fn file(self, path: &str, data: impl Into<Bytes>) -> Result<Self, BuildError> {
        self.stage(
            path,
            Staged::File {
                data: data.into(),
                executable: false,
            },
        )
    }

    /// Stage an executable file at the given slash-separated path.
    pub fn exec(self, path: &str, data: impl Into<Bytes>) -> Result<Self, BuildError> {
        self.stage(
            path,
            Staged::File {
                data: data.into(),
                executable: true,
            },
        )
    }

    /// Stage a symbolic link with the given target string.
    pub fn symlink(self, path: &str, target: &str) -> Result<Self, BuildError> {
        self.stage(path, Staged::Symlink(target.to_string()))
    }

    /// Stage a submodule pointer.
    pub fn gitlink(self, path: &str, id: ObjectId) -> Result<Self, BuildError> {
        self.stage(path, Staged::Gitlink(id))
    }

    /// Stage an empty directory at the given slash-separated path.
    pub fn dir(self, path: &str) -> Result<Self, BuildError> {
        self.stage(path, Staged::Dir(BTreeMap::new()))
    }

    /// Add a parent commit.
    pub fn parent(mut self, id: ObjectId) -> Self {
        self.parents.push(id);
        self
    }

    /// Set the author signature.
    pub fn author(mut self, author: Signature) -> Self {
        self.author = author;
        self
    }

    /// Set the committer signature.
    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = committer;
        self
    }

    /// Set the commit message.
    pub fn message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    /// Write the staged tree and the commit; returns the commit id.
    pub fn write(self) -> Result<ObjectId, BuildError> {
        let CommitRecorder {
            builder,
            root,
            parents,
            author,
            committer,
            message,
        } = self;
        let tree = store_dir(builder, &root)?;
        let commit = Commit {
            tree,
            parents,
            author,
            committer,
            message,
        };
        builder.put_structured(&StoredObject::Commit(commit))
    }

    fn stage(mut self, path: &str, entry: Staged) -> Result<Self, BuildError> {
        let components: Vec<&str> = path.split('/').collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(BuildError::EmptyPath(path.to_string()));
        }
        let (last, dirs) = components.split_last().expect("split yields one element");

        let mut current = &mut self.root;
        for dir in dirs {
            let slot = current
                .entry(dir.to_string())
                .or_insert_with(|| Staged::Dir(BTreeMap::new()));
            match slot {
                Staged::Dir(children) => current = children,
                _ => return Err(BuildError::ConflictingPath(path.to_string())),
            }
        }
        if current.contains_key(*last) {
            return Err(BuildError::ConflictingPath(path.to_string()));
        }
        current.insert(last.to_string(), entry);
        Ok(self)
    }
}

fn store_dir(
    builder: &mut MemoryStoreBuilder,
    dir: &BTreeMap<String, Staged>,
) -> Result<ObjectId, BuildError> {
    let mut entries = Vec::with_capacity(dir.len());
    for (name, staged) in dir {
        let (id, mode) = match staged {
            Staged::File { data, executable } => {
                let id = builder.put_blob(data.clone());
                let mode = if *executable {
                    FileMode::ExecutableFile
                } else {
                    FileMode::RegularFile
                };
                (id, mode)
            }
            Staged::Symlink(target) => {
                let id = builder.put_blob(Bytes::from(target.clone().into_bytes()));
                (id, FileMode::Symlink)
            }
            Staged::Gitlink(id) => (*id, FileMode::Gitlink),
            Staged::Dir(children) => (store_dir(builder, children)?, FileMode::Tree),
        };
        entries.push(TreeEntry {
            name: name.clone(),
            id,
            mode,
        });
    }
    builder.put_structured(&StoredObject::Tree(Tree { entries }))
}

/// The signature used when a commit recorder is given none.
fn default_signature() -> Signature {
    Signature {
        name: "gitjfs".to_string(),
        email: "gitjfs@localhost".to_string(),
        when: DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00")
            .expect("constant timestamp parses"),
    }
}
