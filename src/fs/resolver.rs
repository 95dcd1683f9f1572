//! The tree resolver: locating a path's object within a commit tree.
//!
//! Tree objects carry no parent pointers, so the walk maintains an explicit
//! stack of entered trees; symlinks may appear at any depth, so names are
//! consumed one at a time rather than precomputed. Cycle detection keys on
//! the pair (current tree, remaining names) because the same tree may be
//! revisited legitimately with a different residual.

use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::backend::{StoreError, StoreReader};
use crate::path::InternalPath;
use crate::repository::{FileMode, ObjectId};

/// How symbolic links are treated during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowLinks {
    /// Never expand a link. A link in a non-final position is a failure; a
    /// final link resolves to the link itself.
    Never,
    /// Expand every link, including a final one.
    Always,
    /// Expand links in non-final positions only; a final link resolves to
    /// the link itself.
    ExceptFinal,
}

/// A resolved object: where it really lives, what it is.
///
/// `real_path` is the absolute internal path that designates this object
/// after resolving all intermediate links but not the final name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitObjectRef {
    /// Absolute internal path of the object.
    pub real_path: InternalPath,
    /// The object's id.
    pub id: ObjectId,
    /// The object's mode.
    pub mode: FileMode,
}

/// Resolution failure, without path context; the file-system surface
/// decorates these with the path string the caller supplied.
#[derive(Debug)]
pub(crate) enum ResolveError {
    /// The path names nothing in this tree.
    NotFound(String),
    /// Existence is ambiguous: a link must be crossed but may not be, or a
    /// link target is absolute.
    CouldNotBeFound(String),
    /// The object store failed.
    Store(StoreError),
}

impl From<StoreError> for ResolveError {
    fn from(e: StoreError) -> Self {
        ResolveError::Store(e)
    }
}

/// The target of a symbolic link, as stored.
pub(crate) enum LinkTarget {
    /// A target relative to the link's directory.
    Relative(InternalPath),
    /// An absolute target, which this file system refuses to traverse.
    /// Carries the raw target string.
    Absolute(String),
}

/// Read and decode a link's blob.
pub(crate) async fn link_target(
    reader: &StoreReader,
    id: &ObjectId,
) -> Result<LinkTarget, StoreError> {
    let bytes = reader.read_blob(id).await?;
    let target = std::str::from_utf8(&bytes)
        .map_err(|_| StoreError::Corrupt("link target is not UTF-8".to_string()))?;
    if target.starts_with('/') {
        return Ok(LinkTarget::Absolute(target.to_string()));
    }
    Ok(LinkTarget::Relative(InternalPath::parse(target)))
}

/// Walk `relative` from `root_tree`, honoring the given link policy.
///
/// An empty input path resolves to the root tree itself.
pub(crate) async fn resolve(
    reader: &StoreReader,
    root_tree: ObjectId,
    relative: &InternalPath,
    behavior: FollowLinks,
) -> Result<GitObjectRef, ResolveError> {
    trace!(path = %relative, ?behavior, "resolving in tree");

    let mut trees: Vec<ObjectId> = vec![root_tree];
    let mut remaining: VecDeque<String> = relative.names().iter().cloned().collect();
    let mut visited: HashSet<(ObjectId, Vec<String>)> = HashSet::new();

    let mut current_path = InternalPath::root();
    let mut current = GitObjectRef {
        real_path: current_path.clone(),
        id: root_tree,
        mode: FileMode::Tree,
    };

    while !remaining.is_empty() {
        let top = *trees.last().expect("tree stack is never empty here");
        let key = (top, remaining.iter().cloned().collect::<Vec<_>>());
        if !visited.insert(key) {
            debug_assert!(
                behavior != FollowLinks::Never,
                "cycled while not following links"
            );
            return Err(ResolveError::NotFound(format!(
                "cycle at {:?}",
                remaining
            )));
        }

        let name = remaining.pop_front().expect("checked nonempty");
        if name == "." || name.is_empty() {
            continue;
        }
        if name == ".." {
            trees.pop();
            let Some(&new_top) = trees.last() else {
                return Err(ResolveError::NotFound(
                    "attempt to move above root".to_string(),
                ));
            };
            current_path = current_path
                .parent()
                .expect("tree stack and current path move in lockstep");
            current = GitObjectRef {
                real_path: current_path.clone(),
                id: new_top,
                mode: FileMode::Tree,
            };
            continue;
        }

        current_path = current_path.resolve_name(&name);
        let tree = reader.read_tree(&top).await?;
        let Some(entry) = tree.find(&name) else {
            return Err(ResolveError::NotFound(format!(
                "could not find {}",
                current_path
            )));
        };
        current = GitObjectRef {
            real_path: current_path.clone(),
            id: entry.id,
            mode: entry.mode,
        };

        match entry.mode {
            FileMode::RegularFile | FileMode::ExecutableFile => {
                if !remaining.is_empty() {
                    return Err(ResolveError::NotFound(format!(
                        "'{}' is a file, but the remaining path is {:?}",
                        current_path, remaining
                    )));
                }
            }
            FileMode::Gitlink => {
                if !remaining.is_empty() {
                    return Err(ResolveError::NotFound(format!(
                        "'{}' is a git link, but the remaining path is {:?}",
                        current_path, remaining
                    )));
                }
            }
            FileMode::Tree => {
                trees.push(entry.id);
            }
            FileMode::Symlink => {
                let follow = match behavior {
                    FollowLinks::Never => {
                        if !remaining.is_empty() {
                            return Err(ResolveError::CouldNotBeFound(format!(
                                "'{}' is a link, links may not be followed, \
                                 and the remaining path is {:?}",
                                current_path, remaining
                            )));
                        }
                        false
                    }
                    FollowLinks::Always => true,
                    FollowLinks::ExceptFinal => !remaining.is_empty(),
                };
                if follow {
                    let target = match link_target(reader, &entry.id).await? {
                        LinkTarget::Relative(target) => target,
                        LinkTarget::Absolute(raw) => {
                            return Err(ResolveError::CouldNotBeFound(format!(
                                "absolute link target encountered: {}",
                                raw
                            )));
                        }
                    };
                    trace!(link = %current_path, target = %target, "expanding link");
                    for name in target.names().iter().rev() {
                        remaining.push_front(name.clone());
                    }
                    current_path = current_path
                        .parent()
                        .expect("a named entry always has a parent");
                }
            }
        }
    }

    Ok(current)
}
