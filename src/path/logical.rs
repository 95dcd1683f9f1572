//! Logical paths: a revision token bound to an internal path and to the
//! file-system instance that produced them.
//!
//! A path is absolute iff it has a root component. Relative paths are
//! interpreted against the default ref, `refs/heads/main`. Equality is
//! same-instance plus equal string form; the per-path resolution cache is
//! never part of equality.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{GitFsError, Result};
use crate::fs::{FollowLinks, GitFileSystem, GitObjectRef};
use crate::repository::ObjectId;

use super::internal::InternalPath;
use super::revision::GitRev;

/// Characters escaped in URI query values. `/` stays literal.
const QUERY_ESCAPE: &AsciiSet = &CONTROLS.add(b'&').add(b'=').add(b'?').add(b'%');

const QUERY_PARAMETER_ROOT: &str = "root";
const QUERY_PARAMETER_INTERNAL_PATH: &str = "internal-path";

/// A logical path in a git file system.
#[derive(Clone)]
pub struct GitPath {
    fs: Arc<GitFileSystem>,
    root: Option<GitRev>,
    internal: InternalPath,
    cache: Arc<Mutex<PathObjectCache>>,
}

/// Cached resolver results for one absolute path, keyed by the observed
/// root sha. `real` holds the follow-except-final result, `link` the
/// follow-all result; when the real object is not a link both slots are
/// equal.
#[derive(Default)]
struct PathObjectCache {
    last_root_sha: Option<ObjectId>,
    real: Option<GitObjectRef>,
    link: Option<GitObjectRef>,
}

impl GitPath {
    pub(crate) fn new_absolute(
        fs: Arc<GitFileSystem>,
        root: GitRev,
        internal: InternalPath,
    ) -> Self {
        debug_assert!(internal.is_absolute());
        GitPath {
            fs,
            root: Some(root),
            internal,
            cache: Arc::new(Mutex::new(PathObjectCache::default())),
        }
    }

    pub(crate) fn new_relative(fs: Arc<GitFileSystem>, internal: InternalPath) -> Self {
        debug_assert!(!internal.is_absolute());
        GitPath {
            fs,
            root: None,
            internal,
            cache: Arc::new(Mutex::new(PathObjectCache::default())),
        }
    }

    /// The file system this path belongs to.
    pub fn file_system(&self) -> &Arc<GitFileSystem> {
        &self.fs
    }

    /// Whether this path has a root component.
    pub fn is_absolute(&self) -> bool {
        self.root.is_some()
    }

    /// The revision token of this path, if it is absolute.
    pub fn revision(&self) -> Option<&GitRev> {
        self.root.as_ref()
    }

    /// The path-root of this path (its root-only form), if it is absolute.
    pub fn root(&self) -> Option<GitPath> {
        let rev = self.root.as_ref()?;
        if self.internal.name_count() == 0 {
            return Some(self.clone());
        }
        Some(GitPath::new_absolute(
            Arc::clone(&self.fs),
            rev.clone(),
            InternalPath::root(),
        ))
    }

    /// Whether this path is a path-root: absolute with zero internal names.
    pub fn is_root(&self) -> bool {
        self.is_absolute() && self.internal.name_count() == 0
    }

    /// The internal path component.
    pub fn internal_path(&self) -> &InternalPath {
        &self.internal
    }

    /// The number of internal names.
    pub fn name_count(&self) -> usize {
        self.internal.name_count()
    }

    /// The name at the given index, as a single-name relative path.
    pub fn name(&self, index: usize) -> Option<GitPath> {
        self.internal
            .name(index)
            .map(|name| GitPath::new_relative(Arc::clone(&self.fs), name))
    }

    /// The names in `[begin, end)` as a relative path.
    pub fn subpath(&self, begin: usize, end: usize) -> Option<GitPath> {
        self.internal
            .subpath(begin, end)
            .map(|sub| GitPath::new_relative(Arc::clone(&self.fs), sub))
    }

    /// The last name as a relative path, or `None` for a path-root.
    pub fn file_name(&self) -> Option<GitPath> {
        self.internal
            .file_name()
            .map(|name| GitPath::new_relative(Arc::clone(&self.fs), name))
    }

    /// This path without its last name.
    pub fn parent(&self) -> Option<GitPath> {
        self.internal.parent().map(|parent| self.with_path(parent))
    }

    /// This path with redundant names removed. Does not access the store.
    pub fn normalize(&self) -> GitPath {
        self.with_path(self.internal.normalize())
    }

    /// Resolve `other` against this path. An absolute `other` is returned
    /// unchanged; an empty `other` leaves this path unchanged.
    pub fn resolve(&self, other: &GitPath) -> Result<GitPath> {
        self.check_same_fs(other)?;
        if other.is_absolute() {
            return Ok(other.clone());
        }
        Ok(self.with_path(self.internal.resolve(&other.internal)))
    }

    /// Resolve a path string against this path. A string starting with `/`
    /// is parsed as an absolute path of this file system.
    pub fn resolve_str(&self, other: &str) -> Result<GitPath> {
        if other.starts_with('/') {
            return self.fs.get_absolute_path(other, &[]);
        }
        Ok(self.with_path(self.internal.resolve(&InternalPath::parse(other))))
    }

    /// The suffix of `other` relative to this path. Fails unless both paths
    /// share root-ness (and root, when absolute) and this path is a prefix
    /// of `other`.
    pub fn relativize(&self, other: &GitPath) -> Result<GitPath> {
        self.check_same_fs(other)?;
        if self.root != other.root {
            return Err(GitFsError::illegal_argument(
                "cannot relativize paths with different roots",
            ));
        }
        let suffix = self
            .internal
            .relativize(&other.internal)
            .map_err(GitFsError::illegal_argument)?;
        Ok(GitPath::new_relative(Arc::clone(&self.fs), suffix))
    }

    /// Whether this path starts with `other`. Paths of another file system
    /// never match.
    pub fn starts_with(&self, other: &GitPath) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs)
            && self.root == other.root
            && self.internal.starts_with(&other.internal)
    }

    /// Whether this path starts with the given path string.
    ///
    /// A syntactically valid prefix yields a boolean; a syntactically
    /// invalid absolute form fails with an invalid-path error.
    pub fn starts_with_str(&self, other: &str) -> Result<bool> {
        let parsed = if other.starts_with('/') {
            self.fs.get_absolute_path(other, &[])?
        } else {
            self.fs.get_relative_path(&[other])?
        };
        Ok(self.starts_with(&parsed))
    }

    /// Whether this path ends with `other`.
    pub fn ends_with(&self, other: &GitPath) -> bool {
        if !Arc::ptr_eq(&self.fs, &other.fs) {
            return false;
        }
        let root_matches = match &other.root {
            Some(root) => Some(root) == self.root.as_ref(),
            None => true,
        };
        root_matches && self.internal.ends_with(&other.internal)
    }

    /// The absolute form of this path: itself if absolute, otherwise the
    /// default revision token plus this path's names. Idempotent.
    ///
    /// The absolute twin of a relative path shares its resolution cache.
    pub fn to_absolute_path(&self) -> GitPath {
        if self.is_absolute() {
            return self.clone();
        }
        GitPath {
            fs: Arc::clone(&self.fs),
            root: Some(GitRev::default_ref()),
            internal: self.internal.to_absolute(),
            cache: Arc::clone(&self.cache),
        }
    }

    /// Compare by string form. Paths of different file systems do not
    /// compare.
    pub fn compare_to(&self, other: &GitPath) -> Result<Ordering> {
        self.check_same_fs(other)?;
        Ok(self.to_string().cmp(&other.to_string()))
    }

    /// The URI of this path: the file system's URI plus `root` and
    /// `internal-path` query parameters.
    pub fn to_uri(&self) -> String {
        let mut query = String::new();
        let internal = utf8_percent_encode(&self.internal.to_string(), QUERY_ESCAPE).to_string();
        match &self.root {
            Some(root) => {
                query.push_str(QUERY_PARAMETER_ROOT);
                query.push('=');
                query.push_str(&utf8_percent_encode(&root.to_string(), QUERY_ESCAPE).to_string());
                query.push('&');
                query.push_str(QUERY_PARAMETER_INTERNAL_PATH);
                query.push('=');
                query.push_str(&internal);
            }
            None => {
                if !internal.is_empty() {
                    query.push_str(QUERY_PARAMETER_INTERNAL_PATH);
                    query.push('=');
                    query.push_str(&internal);
                }
            }
        }
        let base = self.fs.uri();
        if query.is_empty() {
            base.to_string()
        } else {
            format!("{}?{}", base, query)
        }
    }

    /// A path of the same file system and kind, holding the given internal
    /// path. Returns this very path when nothing changes, preserving its
    /// cache.
    pub(crate) fn with_path(&self, internal: InternalPath) -> GitPath {
        if internal == self.internal {
            return self.clone();
        }
        if internal.is_absolute() {
            let root = self
                .root
                .clone()
                .expect("an absolute internal path requires a root");
            return GitPath::new_absolute(Arc::clone(&self.fs), root, internal);
        }
        GitPath::new_relative(Arc::clone(&self.fs), internal)
    }

    fn check_same_fs(&self, other: &GitPath) -> Result<()> {
        if !Arc::ptr_eq(&self.fs, &other.fs) {
            return Err(GitFsError::illegal_argument(
                "paths belong to different file systems",
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Resolution cache
    // =========================================================================

    /// Consult the cache for the given policy, provided the root still
    /// resolves to `current_sha`. The no-follow policy never uses the cache.
    pub(crate) fn cached_object(
        &self,
        current_sha: &ObjectId,
        behavior: FollowLinks,
    ) -> Option<GitObjectRef> {
        let mut cache = self.cache.lock().unwrap();
        if cache.last_root_sha.as_ref() != Some(current_sha) {
            cache.real = None;
            cache.link = None;
            cache.last_root_sha = None;
            return None;
        }
        match behavior {
            FollowLinks::ExceptFinal => cache.real.clone(),
            FollowLinks::Always => cache.link.clone(),
            FollowLinks::Never => None,
        }
    }

    /// Record a follow-except-final result. A non-link result also fills
    /// the follow-all slot; a link result clears it.
    pub(crate) fn cache_real_object(&self, root_sha: ObjectId, object: GitObjectRef) {
        let mut cache = self.cache.lock().unwrap();
        cache.last_root_sha = Some(root_sha);
        if object.mode.is_symlink() {
            cache.link = None;
        } else {
            cache.link = Some(object.clone());
        }
        cache.real = Some(object);
    }

    /// Record a follow-all result.
    pub(crate) fn cache_link_object(&self, root_sha: ObjectId, object: GitObjectRef) {
        let mut cache = self.cache.lock().unwrap();
        cache.last_root_sha = Some(root_sha);
        cache.real = None;
        cache.link = Some(object);
    }
}

impl fmt::Display for GitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = &self.root {
            f.write_str(&root.string_form())?;
        }
        write!(f, "{}", self.internal)
    }
}

impl fmt::Debug for GitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitPath({})", self)
    }
}

impl PartialEq for GitPath {
    /// Same file-system instance and equal string form.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs) && self.to_string() == other.to_string()
    }
}

impl Eq for GitPath {}

impl Hash for GitPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.fs) as usize).hash(state);
        self.to_string().hash(state);
    }
}
