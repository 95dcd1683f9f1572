//! Directory streams over commit trees.
//!
//! A stream hands out its iterator exactly once. The iterator reads ahead by
//! one element: once `has_next` has returned true, the following `next`
//! cannot fail. Entries resolve against the path the stream was opened with,
//! so listing a relative directory yields relative paths. Each yielded
//! path's absolute form is pre-seeded with the entry's resolved object, so
//! attribute reads on listed entries need no further tree walk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{GitFsError, Result};
use crate::path::{GitPath, InternalPath};
use crate::repository::{ObjectId, Tree};

use super::resolver::GitObjectRef;

/// A predicate applied to each candidate entry. A failing filter surfaces
/// from the iterator's `has_next`.
pub type DirectoryFilter = Box<dyn Fn(&GitPath) -> Result<bool> + Send + Sync>;

pub(crate) struct DirStreamShared {
    closed: AtomicBool,
}

impl DirStreamShared {
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A single-use stream over the entries of one directory.
pub struct GitDirectoryStream {
    shared: Arc<DirStreamShared>,
    pending: Mutex<Option<GitDirectoryIter>>,
}

impl GitDirectoryStream {
    pub(crate) fn new(
        base: GitPath,
        root_sha: ObjectId,
        real_dir_path: InternalPath,
        tree: Arc<Tree>,
        filter: Option<DirectoryFilter>,
    ) -> (Self, Arc<DirStreamShared>) {
        let shared = Arc::new(DirStreamShared {
            closed: AtomicBool::new(false),
        });
        let iter = GitDirectoryIter {
            shared: Arc::clone(&shared),
            base,
            root_sha,
            real_dir_path,
            tree,
            filter,
            index: 0,
            next: None,
        };
        (
            GitDirectoryStream {
                shared: Arc::clone(&shared),
                pending: Mutex::new(Some(iter)),
            },
            shared,
        )
    }

    /// Obtain the iterator. A second call, or a call on a closed stream,
    /// fails with an illegal-state error.
    pub fn iterator(&self) -> Result<GitDirectoryIter> {
        if self.shared.is_closed() {
            return Err(GitFsError::illegal_state(
                "directory stream is closed",
            ));
        }
        self.pending
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| GitFsError::illegal_state("iterator was already obtained"))
    }

    /// Close the stream. Idempotent. An iterator already handed out keeps
    /// returning its read-ahead element, then reports exhaustion.
    pub fn close(&self) {
        self.shared.close();
    }
}

/// Iterator over directory entries, with one-element read-ahead.
pub struct GitDirectoryIter {
    shared: Arc<DirStreamShared>,
    base: GitPath,
    root_sha: ObjectId,
    real_dir_path: InternalPath,
    tree: Arc<Tree>,
    filter: Option<DirectoryFilter>,
    index: usize,
    next: Option<GitPath>,
}

impl GitDirectoryIter {
    /// Whether another entry is available, reading ahead to make sure.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.next.is_some() {
            return Ok(true);
        }
        if self.shared.is_closed() {
            return Ok(false);
        }
        while self.index < self.tree.entries.len() {
            let entry = &self.tree.entries[self.index];
            self.index += 1;

            let path = self
                .base
                .with_path(self.base.internal_path().resolve_name(&entry.name));
            let resolved = GitObjectRef {
                real_path: self.real_dir_path.resolve_name(&entry.name),
                id: entry.id,
                mode: entry.mode,
            };
            path.to_absolute_path()
                .cache_real_object(self.root_sha, resolved);

            let accepted = match &self.filter {
                Some(filter) => filter(&path)?,
                None => true,
            };
            if accepted {
                self.next = Some(path);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The next entry, or `None` when the stream is exhausted or closed.
    ///
    /// After `has_next` has returned true, this cannot fail.
    pub fn next(&mut self) -> Result<Option<GitPath>> {
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self.next.take())
    }
}
