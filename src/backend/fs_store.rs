//! On-disk object store.
//!
//! Layout under the store directory:
//!
//! ```text
//! objects/<40-hex>   one file per object; structural objects are canonical
//!                    JSON, blobs carry a `blob <len>\0` header before their
//!                    raw bytes
//! refs/<name...>     one file per direct ref, containing 40 hex digits
//! ```
//!
//! The read side implements [`ObjectStore`]. The write side consists of
//! inherent methods used by tooling and tests; the file-system surface never
//! writes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::path::GitRev;
use crate::repository::{
    blob_object_id, from_json, structured_object_id, to_canonical_json, Commit, ObjectId,
    StoredObject, Tree,
};

use super::object_store::{ObjectStore, StoreError, StoreResult};

const BLOB_HEADER_PREFIX: &[u8] = b"blob ";

/// A directory-backed implementation of [`ObjectStore`].
pub struct FsObjectStore {
    dir: PathBuf,
}

impl FsObjectStore {
    /// Open an existing store directory.
    ///
    /// Fails with `StoreError::NotFound` if the directory or its `objects/`
    /// subdirectory does not exist.
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !fs::try_exists(dir.join("objects")).await? {
            return Err(StoreError::NotFound);
        }
        Ok(Self { dir })
    }

    /// Create the store layout under the given directory and open it.
    pub async fn create(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("objects")).await?;
        fs::create_dir_all(dir.join("refs")).await?;
        Ok(Self { dir })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.dir.join("objects").join(id.to_hex())
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        // Ref names never contain "..", "//" or "\": validated on write, and
        // reads of unvalidated names only ever come from ref enumeration.
        self.dir.join(name)
    }

    async fn read_object_bytes(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        Ok(fs::read(self.object_path(id)).await?)
    }

    async fn read_structured(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        let bytes = self.read_object_bytes(id).await?;
        if bytes.starts_with(BLOB_HEADER_PREFIX) {
            return Err(StoreError::TypeMismatch {
                expected: "structural object",
                actual: "blob",
            });
        }
        Ok(from_json(&bytes)?)
    }

    // =========================================================================
    // Write side (tooling and tests only)
    // =========================================================================

    /// Store a blob; returns its id.
    pub async fn put_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = blob_object_id(data);
        let mut framed = Vec::with_capacity(data.len() + 16);
        framed.extend_from_slice(format!("blob {}\0", data.len()).as_bytes());
        framed.extend_from_slice(data);
        self.write_object_file(&id, &framed).await?;
        Ok(id)
    }

    /// Store a structural object; returns its id.
    pub async fn put_object(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let json = to_canonical_json(object)?;
        let id = structured_object_id(&json);
        self.write_object_file(&id, &json).await?;
        Ok(id)
    }

    /// Point a direct ref at an object id, creating parent directories.
    pub async fn set_ref(&self, name: &str, id: ObjectId) -> StoreResult<()> {
        GitRev::validate_ref_name(name)
            .map_err(|e| StoreError::Corrupt(format!("invalid ref name {}: {}", name, e)))?;
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, format!("{}\n", id.to_hex())).await?;
        Ok(())
    }

    async fn write_object_file(&self, id: &ObjectId, bytes: &[u8]) -> StoreResult<()> {
        let path = self.object_path(id);
        if fs::try_exists(&path).await? {
            // Content-addressed: an existing file already holds these bytes.
            return Ok(());
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn read_blob(&self, id: &ObjectId) -> StoreResult<Bytes> {
        let bytes = self.read_object_bytes(id).await?;
        let Some(rest) = bytes.strip_prefix(BLOB_HEADER_PREFIX) else {
            return Err(StoreError::TypeMismatch {
                expected: "blob",
                actual: "structural object",
            });
        };
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| StoreError::Corrupt("blob header missing terminator".to_string()))?;
        let declared: usize = std::str::from_utf8(&rest[..nul])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreError::Corrupt("blob header length unreadable".to_string()))?;
        let data = &rest[nul + 1..];
        if data.len() != declared {
            return Err(StoreError::Corrupt(format!(
                "blob length mismatch: header says {}, found {}",
                declared,
                data.len()
            )));
        }
        Ok(Bytes::copy_from_slice(data))
    }

    async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        match self.read_structured(id).await? {
            StoredObject::Commit(commit) => Ok(commit),
            other => Err(StoreError::TypeMismatch {
                expected: "commit",
                actual: other.type_name(),
            }),
        }
    }

    async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        match self.read_structured(id).await? {
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
        let bytes = self.read_object_bytes(id).await?;
        if let Some(rest) = bytes.strip_prefix(BLOB_HEADER_PREFIX) {
            if let Some(nul) = rest.iter().position(|&b| b == 0) {
                return Ok((rest.len() - nul - 1) as u64);
            }
        }
        Ok(bytes.len() as u64)
    }

    async fn refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>> {
        let refs_dir = self.dir.join("refs");
        let mut found = Vec::new();
        let mut pending = vec![(refs_dir.clone(), "refs".to_string())];
        while let Some((dir, name_prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let Ok(file_name) = entry.file_name().into_string() else {
                    return Err(StoreError::Corrupt(format!(
                        "non UTF-8 ref name under {}",
                        dir.display()
                    )));
                };
                let full_name = format!("{}/{}", name_prefix, file_name);
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), full_name));
                } else if full_name.starts_with(prefix) {
                    let id = self.read_ref_file(&entry.path()).await?;
                    found.push((full_name, id));
                }
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    async fn resolve_ref(&self, name: &str) -> StoreResult<Option<ObjectId>> {
        let path = self.ref_path(name);
        match fs::try_exists(&path).await? {
            false => Ok(None),
            true => Ok(Some(self.read_ref_file(&path).await?)),
        }
    }
}

impl FsObjectStore {
    async fn read_ref_file(&self, path: &Path) -> StoreResult<ObjectId> {
        let content = fs::read_to_string(path).await?;
        content
            .trim()
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("unreadable ref at {}: {}", path.display(), e)))
    }
}
