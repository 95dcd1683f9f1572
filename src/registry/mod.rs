//! The multi-instance registry: live file systems addressable by opaque
//! URIs, on-disk directory or in-memory repository name.
//!
//! Each live instance appears under exactly one key. Opening a key that is
//! already live fails; looking up a key that is not live fails; closing an
//! instance removes its entry.

mod uri;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use tracing::debug;

use crate::backend::{FsObjectStore, MemoryObjectStore, StoreError};
use crate::error::{GitFsError, Result};
use crate::fs::GitFileSystem;
use crate::path::{GitPath, GitRev, InternalPath};

use uri::Authority;

/// The key under which an instance is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RegistryKey {
    /// An on-disk store, keyed by absolute directory.
    OnDisk(PathBuf),
    /// An in-memory store, keyed by its descriptive name. May be empty.
    InMemory(String),
}

impl std::fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryKey::OnDisk(dir) => write!(f, "{}", dir.display()),
            RegistryKey::InMemory(name) => write!(f, "{:?}", name),
        }
    }
}

pub(crate) struct RegistryShared {
    on_disk: Mutex<HashMap<PathBuf, Arc<GitFileSystem>>>,
    in_memory: Mutex<HashMap<String, Arc<GitFileSystem>>>,
}

impl RegistryShared {
    /// Remove the entry for a closing instance. The entry must be present.
    pub(crate) fn remove(&self, key: &RegistryKey) -> Result<()> {
        let removed = match key {
            RegistryKey::OnDisk(dir) => self.on_disk.lock().unwrap().remove(dir).is_some(),
            RegistryKey::InMemory(name) => self.in_memory.lock().unwrap().remove(name).is_some(),
        };
        debug!(%key, removed, "removing closed file system");
        if removed {
            Ok(())
        } else {
            Err(GitFsError::illegal_state(format!(
                "closing file system was not registered: {}",
                key
            )))
        }
    }
}

/// The registry of live file-system instances.
pub struct GitFileSystems {
    shared: Arc<RegistryShared>,
}

static DEFAULT_REGISTRY: LazyLock<GitFileSystems> = LazyLock::new(GitFileSystems::new);

impl GitFileSystems {
    /// A fresh, empty registry.
    pub fn new() -> Self {
        GitFileSystems {
            shared: Arc::new(RegistryShared {
                on_disk: Mutex::new(HashMap::new()),
                in_memory: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The process-wide registry, initialized on first use.
    ///
    /// Prefer passing a registry explicitly; this accessor exists for
    /// callers that need the installed-provider behavior.
    pub fn default_registry() -> &'static GitFileSystems {
        &DEFAULT_REGISTRY
    }

    /// Open a file system over an on-disk store, keyed by the store's
    /// absolute directory.
    pub fn open_on_disk(&self, store: FsObjectStore) -> Result<Arc<GitFileSystem>> {
        let dir = std::path::absolute(store.dir())
            .map_err(|e| GitFsError::Store(StoreError::Io(e)))?;
        let uri = uri::file_uri(&dir);
        let key = RegistryKey::OnDisk(dir.clone());

        let mut on_disk = self.shared.on_disk.lock().unwrap();
        match on_disk.entry(dir) {
            Entry::Occupied(entry) => Err(GitFsError::AlreadyExists {
                key: entry.key().display().to_string(),
            }),
            Entry::Vacant(entry) => {
                let fs = GitFileSystem::new(
                    Arc::new(store),
                    uri,
                    key,
                    Arc::downgrade(&self.shared),
                );
                entry.insert(Arc::clone(&fs));
                Ok(fs)
            }
        }
    }

    /// Open a file system over an in-memory store, keyed by the store's
    /// descriptive name. The caller may keep its own handle to the store,
    /// for instance to move refs out of band.
    pub fn open_in_memory(&self, store: Arc<MemoryObjectStore>) -> Result<Arc<GitFileSystem>> {
        let name = store.name().to_string();
        let uri = uri::dfs_uri(&name);
        let key = RegistryKey::InMemory(name.clone());

        let mut in_memory = self.shared.in_memory.lock().unwrap();
        match in_memory.entry(name) {
            Entry::Occupied(entry) => Err(GitFsError::AlreadyExists {
                key: format!("{:?}", entry.key()),
            }),
            Entry::Vacant(entry) => {
                let fs = GitFileSystem::new(store, uri, key, Arc::downgrade(&self.shared));
                entry.insert(Arc::clone(&fs));
                Ok(fs)
            }
        }
    }

    /// The live instance for an on-disk directory.
    pub fn get_from_dir(&self, dir: &Path) -> Result<Arc<GitFileSystem>> {
        let dir = std::path::absolute(dir).map_err(|e| GitFsError::Store(StoreError::Io(e)))?;
        self.shared
            .on_disk
            .lock()
            .unwrap()
            .get(&dir)
            .cloned()
            .ok_or_else(|| GitFsError::FileSystemNotFound {
                key: dir.display().to_string(),
            })
    }

    /// The live instance for an in-memory repository name.
    pub fn get_from_name(&self, name: &str) -> Result<Arc<GitFileSystem>> {
        self.shared
            .in_memory
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GitFsError::FileSystemNotFound {
                key: format!("{:?}", name),
            })
    }

    /// The live instance a URI designates, routing on the authority.
    pub fn get_from_uri(&self, uri: &str) -> Result<Arc<GitFileSystem>> {
        let parsed = uri::parse_uri(uri)?;
        match parsed.authority {
            Authority::File => {
                let dir = uri::file_uri_dir(&parsed, uri)?;
                self.get_from_dir(&dir)
            }
            Authority::Dfs => {
                let name = uri::dfs_uri_name(&parsed, uri)?;
                self.get_from_name(&name)
            }
        }
    }

    /// The path a URI designates: the instance's URI plus the optional
    /// `root` and `internal-path` query parameters.
    pub fn get_path_from_uri(&self, uri: &str) -> Result<GitPath> {
        let parsed = uri::parse_uri(uri)?;
        let fs = match parsed.authority {
            Authority::File => {
                let dir = uri::file_uri_dir(&parsed, uri)?;
                self.get_from_dir(&dir)?
            }
            Authority::Dfs => {
                let name = uri::dfs_uri_name(&parsed, uri)?;
                self.get_from_name(&name)?
            }
        };

        let internal_value = parsed.query_value("internal-path");
        match parsed.query_value("root") {
            Some(root) => {
                let rev = GitRev::parse_token(root)?;
                let internal_value = internal_value.ok_or_else(|| GitFsError::InvalidPath {
                    reason: format!("{}: a rooted URI requires an internal-path", uri),
                })?;
                let internal = InternalPath::parse(internal_value);
                if !internal.is_absolute() {
                    return Err(GitFsError::InvalidPath {
                        reason: format!("{}: a rooted internal path must start with /", uri),
                    });
                }
                Ok(GitPath::new_absolute(fs, rev, internal))
            }
            None => {
                let internal = InternalPath::parse(internal_value.unwrap_or(""));
                if internal.is_absolute() {
                    return Err(GitFsError::InvalidPath {
                        reason: format!("{}: a rootless internal path must be relative", uri),
                    });
                }
                Ok(GitPath::new_relative(fs, internal))
            }
        }
    }

    /// How many instances are currently live.
    pub fn live_count(&self) -> usize {
        self.shared.on_disk.lock().unwrap().len() + self.shared.in_memory.lock().unwrap().len()
    }
}

impl Default for GitFileSystems {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStoreBuilder;

    fn store(name: &str) -> Arc<MemoryObjectStore> {
        Arc::new(MemoryStoreBuilder::new(name).build())
    }

    #[test]
    fn test_open_lookup_close_in_memory() {
        let registry = GitFileSystems::new();
        let fs = registry.open_in_memory(store("repo")).unwrap();
        assert_eq!(fs.uri(), "gitjfs://DFS/repo");

        let found = registry.get_from_name("repo").unwrap();
        assert!(Arc::ptr_eq(&fs, &found));
        let by_uri = registry.get_from_uri("gitjfs://DFS/repo").unwrap();
        assert!(Arc::ptr_eq(&fs, &by_uri));

        fs.close().unwrap();
        assert!(matches!(
            registry.get_from_name("repo"),
            Err(GitFsError::FileSystemNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_name_rejected_until_closed() {
        let registry = GitFileSystems::new();
        let first = registry.open_in_memory(store("repo")).unwrap();
        assert!(matches!(
            registry.open_in_memory(store("repo")),
            Err(GitFsError::AlreadyExists { .. })
        ));
        first.close().unwrap();
        let third = registry.open_in_memory(store("repo"));
        assert!(third.is_ok());
    }

    #[test]
    fn test_empty_name_is_allowed() {
        let registry = GitFileSystems::new();
        let fs = registry.open_in_memory(store("")).unwrap();
        assert_eq!(fs.uri(), "gitjfs://DFS/");
        assert!(registry.get_from_name("").is_ok());
        fs.close().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = GitFileSystems::new();
        let fs = registry.open_in_memory(store("repo")).unwrap();
        fs.close().unwrap();
        fs.close().unwrap();
        assert!(!fs.is_open());
    }

    #[test]
    fn test_unknown_uri_lookups_fail() {
        let registry = GitFileSystems::new();
        assert!(matches!(
            registry.get_from_uri("gitjfs://DFS/ghost"),
            Err(GitFsError::FileSystemNotFound { .. })
        ));
        assert!(matches!(
            registry.get_from_uri("gitjfs://FILE/no/such/dir/"),
            Err(GitFsError::FileSystemNotFound { .. })
        ));
    }
}
