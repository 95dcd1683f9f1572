//! The file-system instance: the public read surface over one repository.
//!
//! An instance is open until closed, exactly once; every read operation
//! checks the open flag first. The instance owns the single store reader and
//! the set of currently open directory streams, both released at close.

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, error};

use crate::backend::{diff_trees, DiffEntry, ObjectStore, StoreError, StoreReader};
use crate::error::{GitFsError, Result};
use crate::path::{GitPath, GitRev, InternalPath};
use crate::registry::{RegistryKey, RegistryShared};
use crate::repository::{Commit, FileMode, ObjectId};

use super::attributes::BasicFileAttributes;
use super::byte_channel::BlobChannel;
use super::dir_stream::{DirStreamShared, DirectoryFilter, GitDirectoryStream};
use super::graph::{CommitGraph, CommitNode};
use super::resolver::{self, FollowLinks, GitObjectRef, LinkTarget, ResolveError};

/// Options accepted when opening a byte channel.
///
/// Only `Read`, `Sync` and `NoFollowLinks` are honored; any writing option
/// fails with a read-only error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOption {
    Read,
    Sync,
    NoFollowLinks,
    Write,
    Append,
    Create,
    CreateNew,
    TruncateExisting,
    DeleteOnClose,
}

/// Access modes checked by [`GitFileSystem::check_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

struct FsState {
    open: bool,
    reader: Option<StoreReader>,
    streams: Vec<Arc<DirStreamShared>>,
}

/// A read-only file system over one repository.
///
/// Instances are created by the registry and handed out as
/// `Arc<GitFileSystem>`; paths keep their instance alive.
pub struct GitFileSystem {
    uri: String,
    key: RegistryKey,
    registry: Weak<RegistryShared>,
    state: Mutex<FsState>,
    graph: tokio::sync::OnceCell<Arc<CommitGraph>>,
}

struct ResolvedPath {
    root_sha: ObjectId,
    commit: Arc<Commit>,
    object: GitObjectRef,
}

impl GitFileSystem {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        uri: String,
        key: RegistryKey,
        registry: Weak<RegistryShared>,
    ) -> Arc<GitFileSystem> {
        Arc::new(GitFileSystem {
            uri,
            key,
            registry,
            state: Mutex::new(FsState {
                open: true,
                reader: Some(StoreReader::new(store, true)),
                streams: Vec::new(),
            }),
            graph: tokio::sync::OnceCell::new(),
        })
    }

    /// The URI identifying this instance in the registry.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether this instance is still open.
    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    /// Always true.
    pub fn is_read_only(&self) -> bool {
        true
    }

    /// The name separator, `/`.
    pub fn separator(&self) -> &'static str {
        "/"
    }

    /// The supported attribute views: only `basic`.
    pub fn supported_file_attribute_views(&self) -> Vec<&'static str> {
        vec!["basic"]
    }

    fn reader(&self) -> Result<StoreReader> {
        let state = self.state.lock().unwrap();
        if !state.open {
            return Err(GitFsError::ClosedFileSystem);
        }
        Ok(state
            .reader
            .as_ref()
            .expect("an open instance always has its reader")
            .clone())
    }

    // =========================================================================
    // Path construction
    // =========================================================================

    /// Parse path strings, absolute or relative: absolute iff the first
    /// non-empty element starts with `/`.
    pub fn get_path(self: &Arc<Self>, first: &str, more: &[&str]) -> Result<GitPath> {
        let absolute = std::iter::once(first)
            .chain(more.iter().copied())
            .find(|part| !part.is_empty())
            .map(|part| part.starts_with('/'))
            .unwrap_or(false);
        if absolute {
            self.get_absolute_path(first, more)
        } else {
            self.get_relative_path_of(std::iter::once(first).chain(more.iter().copied()))
        }
    }

    /// Parse an absolute path: a root component of the form `/refs/…/` or
    /// `/<40 hex>/`, then internal names. The root and internal parts may be
    /// separated by the `//` marker within the first element.
    pub fn get_absolute_path(self: &Arc<Self>, first: &str, more: &[&str]) -> Result<GitPath> {
        let (root_string, internal_parts): (String, Vec<String>) = match first.find("//") {
            Some(index) => {
                let root = first[..index + 1].to_string();
                let after = first[index + 1..].to_string();
                let mut parts = vec![after];
                parts.extend(more.iter().map(|s| s.to_string()));
                (root, parts)
            }
            None => {
                let mut parts: Vec<String> = more.iter().map(|s| s.to_string()).collect();
                match parts.first_mut() {
                    None => parts.push("/".to_string()),
                    Some(head) if !head.starts_with('/') => {
                        *head = format!("/{}", head);
                    }
                    Some(_) => {}
                }
                (first.to_string(), parts)
            }
        };

        let rev = GitRev::from_string_form(&root_string)?;
        let internal = InternalPath::join(internal_parts.iter().map(String::as_str));
        debug_assert!(internal.is_absolute());
        Ok(GitPath::new_absolute(Arc::clone(self), rev, internal))
    }

    /// Parse a relative path from name elements.
    pub fn get_relative_path(self: &Arc<Self>, names: &[&str]) -> Result<GitPath> {
        self.get_relative_path_of(names.iter().copied())
    }

    fn get_relative_path_of<'a>(
        self: &Arc<Self>,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<GitPath> {
        let internal = InternalPath::join(names);
        if internal.is_absolute() {
            return Err(GitFsError::invalid_path(
                "a relative path must not start with /",
            ));
        }
        Ok(GitPath::new_relative(Arc::clone(self), internal))
    }

    /// The path-root for a commit id. No store access.
    pub fn get_path_root(self: &Arc<Self>, commit_id: ObjectId) -> GitPath {
        GitPath::new_absolute(
            Arc::clone(self),
            GitRev::commit(commit_id),
            InternalPath::root(),
        )
    }

    /// Parse a path-root from its string form, `/…/`.
    pub fn get_path_root_from_str(self: &Arc<Self>, root: &str) -> Result<GitPath> {
        let rev = GitRev::from_string_form(root)?;
        Ok(GitPath::new_absolute(
            Arc::clone(self),
            rev,
            InternalPath::root(),
        ))
    }

    /// Parse a ref-based path-root from its string form; a commit id is
    /// rejected.
    pub fn get_path_root_ref(self: &Arc<Self>, root: &str) -> Result<GitPath> {
        let rev = GitRev::from_string_form(root)?;
        if !rev.is_ref() {
            return Err(GitFsError::invalid_path(format!(
                "{}: expected a ref, not a commit id",
                root
            )));
        }
        Ok(GitPath::new_absolute(
            Arc::clone(self),
            rev,
            InternalPath::root(),
        ))
    }

    /// The default path-root, on `refs/heads/main`.
    pub fn default_root(self: &Arc<Self>) -> GitPath {
        GitPath::new_absolute(
            Arc::clone(self),
            GitRev::default_ref(),
            InternalPath::root(),
        )
    }

    /// The empty path.
    pub fn empty_path(self: &Arc<Self>) -> GitPath {
        GitPath::new_relative(Arc::clone(self), InternalPath::empty())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn check_own_path(&self, path: &GitPath) -> Result<()> {
        if !std::ptr::eq(Arc::as_ptr(path.file_system()), self) {
            return Err(GitFsError::illegal_argument(
                "path belongs to a different file system",
            ));
        }
        Ok(())
    }

    /// The commit id a revision token currently resolves to.
    async fn resolve_rev_sha(&self, rev: &GitRev, context: &str) -> Result<ObjectId> {
        match rev {
            GitRev::CommitId(id) => Ok(*id),
            GitRev::Ref(name) => {
                let reader = self.reader()?;
                reader
                    .resolve_ref(name)
                    .await?
                    .ok_or_else(|| GitFsError::no_such_file(context))
            }
        }
    }

    async fn resolve_rev_commit(
        &self,
        rev: &GitRev,
        context: &str,
    ) -> Result<(ObjectId, Arc<Commit>)> {
        let sha = self.resolve_rev_sha(rev, context).await?;
        let reader = self.reader()?;
        let commit = reader.read_commit(&sha).await.map_err(|e| match e {
            StoreError::NotFound => GitFsError::no_such_file(context),
            other => GitFsError::Store(other),
        })?;
        Ok((sha, commit))
    }

    async fn resolve_path(&self, path: &GitPath, behavior: FollowLinks) -> Result<ResolvedPath> {
        self.check_own_path(path)?;
        let absolute = path.to_absolute_path();
        let rev = absolute
            .revision()
            .cloned()
            .expect("an absolute path has a revision");
        let context = path.to_string();
        let (root_sha, commit) = self.resolve_rev_commit(&rev, &context).await?;

        if let Some(object) = absolute.cached_object(&root_sha, behavior) {
            return Ok(ResolvedPath {
                root_sha,
                commit,
                object,
            });
        }

        let relative = InternalPath::root()
            .relativize(absolute.internal_path())
            .expect("the root prefixes every absolute internal path");
        let reader = self.reader()?;
        let object = resolver::resolve(&reader, commit.tree, &relative, behavior)
            .await
            .map_err(|e| match e {
                ResolveError::NotFound(reason) => {
                    debug!(path = %context, %reason, "path not found");
                    GitFsError::no_such_file(context.clone())
                }
                ResolveError::CouldNotBeFound(reason) => {
                    GitFsError::path_could_not_be_found(context.clone(), reason)
                }
                ResolveError::Store(e) => GitFsError::Store(e),
            })?;

        match behavior {
            FollowLinks::ExceptFinal => absolute.cache_real_object(root_sha, object.clone()),
            FollowLinks::Always => absolute.cache_link_object(root_sha, object.clone()),
            FollowLinks::Never => {}
        }

        Ok(ResolvedPath {
            root_sha,
            commit,
            object,
        })
    }

    // =========================================================================
    // Read operations
    // =========================================================================

    /// Whether the path names an existing object.
    pub async fn exists(&self, path: &GitPath, follow_links: bool) -> Result<bool> {
        match self.read_attributes(path, follow_links).await {
            Ok(_) => Ok(true),
            Err(GitFsError::NoSuchFile { .. }) | Err(GitFsError::PathCouldNotBeFound { .. }) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Open a read-only byte channel over a blob.
    pub async fn new_byte_channel(
        &self,
        path: &GitPath,
        options: &[OpenOption],
    ) -> Result<BlobChannel> {
        let writing = options.iter().any(|option| {
            matches!(
                option,
                OpenOption::Write
                    | OpenOption::Append
                    | OpenOption::Create
                    | OpenOption::CreateNew
                    | OpenOption::TruncateExisting
                    | OpenOption::DeleteOnClose
            )
        });
        if writing {
            return Err(GitFsError::ReadOnlyFileSystem);
        }
        let follow = !options.contains(&OpenOption::NoFollowLinks);

        let behavior = if follow {
            FollowLinks::Always
        } else {
            FollowLinks::Never
        };
        let resolved = self.resolve_path(path, behavior).await?;
        if !follow && resolved.object.mode.is_symlink() {
            return Err(GitFsError::path_could_not_be_found(
                path.to_string(),
                "path ends with a symbolic link",
            ));
        }
        if resolved.object.mode.is_tree() {
            return Err(GitFsError::IsADirectory {
                path: path.to_string(),
            });
        }
        let reader = self.reader()?;
        let bytes = reader.read_blob(&resolved.object.id).await?;
        Ok(BlobChannel::new(bytes))
    }

    /// Read the whole blob at the path.
    pub async fn read(&self, path: &GitPath) -> Result<bytes::Bytes> {
        let channel = self.new_byte_channel(path, &[OpenOption::Read]).await?;
        Ok(channel.remaining_bytes())
    }

    /// Read basic attributes. With links unfollowed, a final symlink yields
    /// the link's own attributes.
    pub async fn read_attributes(
        &self,
        path: &GitPath,
        follow_links: bool,
    ) -> Result<BasicFileAttributes> {
        let behavior = if follow_links {
            FollowLinks::Always
        } else {
            FollowLinks::Never
        };
        let resolved = self.resolve_path(path, behavior).await?;
        let reader = self.reader()?;
        let size = reader.object_size(&resolved.object.id).await?;
        Ok(BasicFileAttributes::new(
            size,
            resolved.commit.committer.when,
            resolved.object.mode,
        ))
    }

    /// Read a symbolic link's target as a relative path.
    pub async fn read_symbolic_link(&self, path: &GitPath) -> Result<GitPath> {
        let resolved = self.resolve_path(path, FollowLinks::ExceptFinal).await?;
        if !resolved.object.mode.is_symlink() {
            return Err(GitFsError::NotALink {
                path: path.to_string(),
            });
        }
        let reader = self.reader()?;
        match resolver::link_target(&reader, &resolved.object.id).await? {
            LinkTarget::Relative(target) => Ok(GitPath::new_relative(
                Arc::clone(path.file_system()),
                target,
            )),
            LinkTarget::Absolute(target) => Err(GitFsError::AbsoluteLink { target }),
        }
    }

    /// The real path of an existing file: absolute, links resolved (unless
    /// following is disabled, in which case a trailing link fails).
    pub async fn to_real_path(&self, path: &GitPath, follow_links: bool) -> Result<GitPath> {
        let absolute = path.to_absolute_path();
        let behavior = if follow_links {
            FollowLinks::Always
        } else {
            FollowLinks::Never
        };
        let resolved = self.resolve_path(&absolute, behavior).await?;
        if !follow_links && resolved.object.mode.is_symlink() {
            return Err(GitFsError::path_could_not_be_found(
                path.to_string(),
                "path ends with a symbolic link",
            ));
        }
        Ok(absolute.with_path(resolved.object.real_path.clone()))
    }

    /// Check that the path exists and the requested access is permitted.
    /// Execute access requires an executable file.
    pub async fn check_access(&self, path: &GitPath, modes: &[AccessMode]) -> Result<()> {
        if modes.contains(&AccessMode::Write) {
            return Err(GitFsError::ReadOnlyFileSystem);
        }
        let resolved = self.resolve_path(path, FollowLinks::Always).await?;
        if modes.contains(&AccessMode::Execute) && resolved.object.mode != FileMode::ExecutableFile
        {
            return Err(GitFsError::AccessDenied {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /// Open a directory stream over the entries of `dir`.
    pub async fn new_directory_stream(
        &self,
        dir: &GitPath,
        filter: Option<DirectoryFilter>,
    ) -> Result<GitDirectoryStream> {
        let resolved = self.resolve_path(dir, FollowLinks::Always).await?;
        if !resolved.object.mode.is_tree() {
            return Err(GitFsError::not_a_directory(dir.to_string()));
        }
        let reader = self.reader()?;
        let tree = reader.read_tree(&resolved.object.id).await?;

        let (stream, shared) = GitDirectoryStream::new(
            dir.clone(),
            resolved.root_sha,
            resolved.object.real_path.clone(),
            tree,
            filter,
        );
        let mut state = self.state.lock().unwrap();
        if !state.open {
            shared.close();
            return Err(GitFsError::ClosedFileSystem);
        }
        state.streams.push(shared);
        Ok(stream)
    }

    // =========================================================================
    // Commit-level operations
    // =========================================================================

    /// One path-root per `refs/…` entry, sorted by ref name.
    pub async fn refs(self: &Arc<Self>) -> Result<Vec<GitPath>> {
        let reader = self.reader()?;
        let refs = reader.refs("refs/").await?;
        let mut roots = Vec::with_capacity(refs.len());
        for (name, _) in refs {
            let rev = GitRev::short_ref(&name)?;
            roots.push(GitPath::new_absolute(
                Arc::clone(self),
                rev,
                InternalPath::root(),
            ));
        }
        Ok(roots)
    }

    /// The commit graph over all refs. Memoized; repeated calls on an open
    /// instance return the same value.
    pub async fn graph(&self) -> Result<Arc<CommitGraph>> {
        let reader = self.reader()?;
        let graph = self
            .graph
            .get_or_try_init(|| async {
                CommitGraph::build(&reader).await.map(Arc::new)
            })
            .await
            .map_err(GitFsError::Store)?;
        Ok(Arc::clone(graph))
    }

    /// The parsed commit a path-root designates.
    pub async fn commit_of(&self, path_root: &GitPath) -> Result<CommitNode> {
        self.check_own_path(path_root)?;
        if !path_root.is_root() {
            return Err(GitFsError::illegal_argument("expected a path-root"));
        }
        let rev = path_root.revision().expect("a path-root is absolute");
        let context = path_root.to_string();
        let (sha, commit) = self.resolve_rev_commit(rev, &context).await?;
        Ok(CommitNode {
            id: sha,
            author: commit.author.clone(),
            committer: commit.committer.clone(),
            parents: commit.parents.clone(),
        })
    }

    /// The parent path-roots of a path-root, in commit order. Served from
    /// the graph when it has already been computed.
    pub async fn parent_commits(self: &Arc<Self>, path_root: &GitPath) -> Result<Vec<GitPath>> {
        self.check_own_path(path_root)?;
        if !path_root.is_root() {
            return Err(GitFsError::illegal_argument("expected a path-root"));
        }
        let rev = path_root.revision().expect("a path-root is absolute");
        let context = path_root.to_string();
        let sha = self.resolve_rev_sha(rev, &context).await?;

        if let Some(graph) = self.graph.get() {
            if let Some(parents) = graph.parents_of(&sha) {
                return Ok(parents
                    .iter()
                    .map(|parent| self.get_path_root(*parent))
                    .collect());
            }
        }

        let node = self.commit_of(path_root).await?;
        Ok(node
            .parents
            .iter()
            .map(|parent| self.get_path_root(*parent))
            .collect())
    }

    /// One path-root per commit reachable from any ref, sorted by id.
    pub async fn root_directories(self: &Arc<Self>) -> Result<Vec<GitPath>> {
        let graph = self.graph().await?;
        let mut ids: Vec<ObjectId> = graph.nodes().map(|node| node.id).collect();
        ids.sort();
        Ok(ids.into_iter().map(|id| self.get_path_root(id)).collect())
    }

    /// The ordered changes between the trees of two path-roots.
    pub async fn diff(&self, first: &GitPath, second: &GitPath) -> Result<Vec<DiffEntry>> {
        self.check_own_path(first)?;
        self.check_own_path(second)?;
        if !first.is_root() || !second.is_root() {
            return Err(GitFsError::illegal_argument("diff expects two path-roots"));
        }
        let first_rev = first.revision().expect("a path-root is absolute");
        let second_rev = second.revision().expect("a path-root is absolute");
        let (_, first_commit) = self
            .resolve_rev_commit(first_rev, &first.to_string())
            .await?;
        let (_, second_commit) = self
            .resolve_rev_commit(second_rev, &second.to_string())
            .await?;
        let reader = self.reader()?;
        Ok(diff_trees(&reader, first_commit.tree, second_commit.tree).await?)
    }

    // =========================================================================
    // Writes and non-applicable reads
    // =========================================================================

    /// Any mutation fails: the file system is read-only.
    pub fn create_directory(&self, _path: &GitPath) -> Result<()> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Any mutation fails: the file system is read-only.
    pub fn create_symbolic_link(&self, _link: &GitPath, _target: &GitPath) -> Result<()> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Any mutation fails: the file system is read-only.
    pub fn create_link(&self, _link: &GitPath, _existing: &GitPath) -> Result<()> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Any mutation fails: the file system is read-only.
    pub fn delete(&self, _path: &GitPath) -> Result<()> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Any mutation fails: the file system is read-only.
    pub fn delete_if_exists(&self, _path: &GitPath) -> Result<bool> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Any mutation fails: the file system is read-only.
    pub fn copy(&self, _source: &GitPath, _target: &GitPath) -> Result<()> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Any mutation fails: the file system is read-only.
    pub fn rename(&self, _source: &GitPath, _target: &GitPath) -> Result<()> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Any mutation fails: the file system is read-only.
    pub fn set_attribute(&self, _path: &GitPath, _attribute: &str) -> Result<()> {
        Err(GitFsError::ReadOnlyFileSystem)
    }

    /// Not applicable to a repository view.
    pub fn file_stores(&self) -> Result<()> {
        Err(GitFsError::Unsupported {
            operation: "file stores",
        })
    }

    /// Not applicable to a repository view.
    pub fn new_watch_service(&self) -> Result<()> {
        Err(GitFsError::Unsupported {
            operation: "watch service",
        })
    }

    /// Not applicable to a repository view.
    pub fn user_principal_lookup_service(&self) -> Result<()> {
        Err(GitFsError::Unsupported {
            operation: "user principal lookup",
        })
    }

    /// Not applicable to a repository view.
    pub fn path_matcher(&self, _syntax_and_pattern: &str) -> Result<()> {
        Err(GitFsError::Unsupported {
            operation: "path matcher",
        })
    }

    /// Not applicable to a repository view.
    pub fn is_hidden(&self, _path: &GitPath) -> Result<bool> {
        Err(GitFsError::Unsupported {
            operation: "hidden files",
        })
    }

    /// Not applicable to a repository view.
    pub fn is_same_file(&self, _first: &GitPath, _second: &GitPath) -> Result<bool> {
        Err(GitFsError::Unsupported {
            operation: "same-file check",
        })
    }

    /// Only the basic attribute view is supported.
    pub fn read_attributes_by_name(&self, _path: &GitPath, _attributes: &str) -> Result<()> {
        Err(GitFsError::Unsupported {
            operation: "attributes by name",
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close this instance: release the reader, close every open directory
    /// stream, and remove the registry entry. Idempotent. The first failure
    /// is returned; later ones are logged.
    pub fn close(&self) -> Result<()> {
        let (reader, streams) = {
            let mut state = self.state.lock().unwrap();
            if !state.open {
                return Ok(());
            }
            state.open = false;
            (state.reader.take(), std::mem::take(&mut state.streams))
        };

        let mut failures: Vec<GitFsError> = Vec::new();

        if let Some(reader) = reader {
            reader.clear_caches();
        }
        for stream in streams {
            stream.close();
        }
        if let Some(registry) = self.registry.upgrade() {
            if let Err(e) = registry.remove(&self.key) {
                failures.push(e);
            }
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(()),
            Some(first) => {
                for later in failures {
                    error!(error = %later, "further problem while closing");
                }
                Err(first)
            }
        }
    }
}

impl std::fmt::Debug for GitFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitFileSystem")
            .field("uri", &self.uri)
            .field("open", &self.is_open())
            .finish()
    }
}
