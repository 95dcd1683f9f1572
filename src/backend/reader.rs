//! The stateful reader owned by a file-system instance.
//!
//! Wraps an object store with small LRU caches for parsed commits and trees
//! (tree walks revisit the same objects constantly) and an opt-in refusal of
//! objects unreachable from any `refs/…` entry.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use lru::LruCache;

use crate::repository::{Commit, ObjectId, Tree};

use super::object_store::{ObjectStore, StoreError, StoreResult};

const COMMIT_CACHE_CAPACITY: usize = 256;
const TREE_CACHE_CAPACITY: usize = 1024;

/// A caching, reachability-checking reader over an object store.
///
/// Cloning is cheap; clones share the caches.
#[derive(Clone)]
pub struct StoreReader {
    inner: Arc<ReaderInner>,
}

struct ReaderInner {
    store: Arc<dyn ObjectStore>,
    refuse_unreachable: bool,
    commits: Mutex<LruCache<ObjectId, Arc<Commit>>>,
    trees: Mutex<LruCache<ObjectId, Arc<Tree>>>,
    reachable: tokio::sync::Mutex<Option<Arc<HashSet<ObjectId>>>>,
}

impl StoreReader {
    /// Create a reader over the given store.
    ///
    /// With `refuse_unreachable` set, object reads fail with
    /// `StoreError::NotFound` unless the object is reachable from some
    /// `refs/…` entry. The reachable set is computed lazily, once.
    pub fn new(store: Arc<dyn ObjectStore>, refuse_unreachable: bool) -> Self {
        Self {
            inner: Arc::new(ReaderInner {
                store,
                refuse_unreachable,
                commits: Mutex::new(LruCache::new(
                    NonZeroUsize::new(COMMIT_CACHE_CAPACITY).expect("nonzero capacity"),
                )),
                trees: Mutex::new(LruCache::new(
                    NonZeroUsize::new(TREE_CACHE_CAPACITY).expect("nonzero capacity"),
                )),
                reachable: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    /// Read and parse a commit, consulting the cache first.
    pub async fn read_commit(&self, id: &ObjectId) -> StoreResult<Arc<Commit>> {
        self.check_reachable(id).await?;
        if let Some(commit) = self.inner.commits.lock().unwrap().get(id) {
            return Ok(Arc::clone(commit));
        }
        let commit = Arc::new(self.inner.store.read_commit(id).await?);
        self.inner
            .commits
            .lock()
            .unwrap()
            .put(*id, Arc::clone(&commit));
        Ok(commit)
    }

    /// Read and parse a tree, consulting the cache first.
    pub async fn read_tree(&self, id: &ObjectId) -> StoreResult<Arc<Tree>> {
        self.check_reachable(id).await?;
        if let Some(tree) = self.inner.trees.lock().unwrap().get(id) {
            return Ok(Arc::clone(tree));
        }
        let tree = Arc::new(self.inner.store.read_tree(id).await?);
        self.inner.trees.lock().unwrap().put(*id, Arc::clone(&tree));
        Ok(tree)
    }

    /// Read a blob's bytes. Blob contents are not cached.
    pub async fn read_blob(&self, id: &ObjectId) -> StoreResult<Bytes> {
        self.check_reachable(id).await?;
        self.inner.store.read_blob(id).await
    }

    /// The stored size of an object.
    pub async fn object_size(&self, id: &ObjectId) -> StoreResult<u64> {
        self.check_reachable(id).await?;
        self.inner.store.object_size(id).await
    }

    /// Enumerate direct refs by prefix.
    pub async fn refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>> {
        self.inner.store.refs(prefix).await
    }

    /// Resolve a direct ref.
    pub async fn resolve_ref(&self, name: &str) -> StoreResult<Option<ObjectId>> {
        self.inner.store.resolve_ref(name).await
    }

    /// Drop cached parse results. Called when the owning instance closes.
    pub fn clear_caches(&self) {
        self.inner.commits.lock().unwrap().clear();
        self.inner.trees.lock().unwrap().clear();
    }

    async fn check_reachable(&self, id: &ObjectId) -> StoreResult<()> {
        if !self.inner.refuse_unreachable {
            return Ok(());
        }
        let mut reachable = self.inner.reachable.lock().await;
        if let Some(set) = reachable.as_ref() {
            if set.contains(id) {
                return Ok(());
            }
        }
        // Unknown id: the refs may have moved since the set was computed,
        // so recompute before refusing.
        let set = compute_reachable(&self.inner.store).await?;
        let known = set.contains(id);
        *reachable = Some(set);
        if known {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}

/// Walk every object reachable from any `refs/…` tip: commits through their
/// parents, trees through their entries, blobs as leaves. Gitlink targets are
/// not part of this repository and are not collected.
async fn compute_reachable(
    store: &Arc<dyn ObjectStore>,
) -> StoreResult<Arc<HashSet<ObjectId>>> {
    let mut reachable = HashSet::new();
    let mut commit_stack: Vec<ObjectId> = store
        .refs("refs/")
        .await?
        .into_iter()
        .map(|(_, id)| id)
        .collect();

    while let Some(commit_id) = commit_stack.pop() {
        if !reachable.insert(commit_id) {
            continue;
        }
        let commit = store.read_commit(&commit_id).await?;
        commit_stack.extend(commit.parents.iter().copied());

        let mut tree_stack = vec![commit.tree];
        while let Some(tree_id) = tree_stack.pop() {
            if !reachable.insert(tree_id) {
                continue;
            }
            let tree = store.read_tree(&tree_id).await?;
            for entry in &tree.entries {
                if entry.mode.is_tree() {
                    tree_stack.push(entry.id);
                } else if !entry.mode.is_gitlink() {
                    reachable.insert(entry.id);
                }
            }
        }
    }
    Ok(Arc::new(reachable))
}
