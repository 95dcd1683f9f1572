//! Tree-to-tree diff.
//!
//! Compares two trees entry by entry and produces an ordered list of
//! file-level changes, pruning subtrees whose id and mode are identical.
//! Rename and copy change types are representable but never produced here;
//! no rename detection is performed.

use crate::repository::{FileMode, ObjectId, Tree};

use super::reader::StoreReader;
use super::StoreResult;

/// The kind of change a diff entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// The path exists only on the new side.
    Add,
    /// The path exists only on the old side.
    Delete,
    /// The path exists on both sides with differing id or mode.
    Modify,
    /// The content moved from `old_path` to `new_path`.
    Rename,
    /// The content was copied from `old_path` to `new_path`.
    Copy,
}

/// One file-level change between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    /// The kind of change.
    pub change_type: ChangeType,
    /// Slash-separated path on the old side, when one exists.
    pub old_path: Option<String>,
    /// Slash-separated path on the new side, when one exists.
    pub new_path: Option<String>,
    /// Object id on the old side.
    pub old_id: Option<ObjectId>,
    /// Object id on the new side.
    pub new_id: Option<ObjectId>,
    /// Mode on the old side.
    pub old_mode: Option<FileMode>,
    /// Mode on the new side.
    pub new_mode: Option<FileMode>,
}

impl DiffEntry {
    /// The path this entry is about: the new path for additions and
    /// modifications, the old path for deletions.
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }

    fn added(path: String, id: ObjectId, mode: FileMode) -> Self {
        DiffEntry {
            change_type: ChangeType::Add,
            old_path: None,
            new_path: Some(path),
            old_id: None,
            new_id: Some(id),
            old_mode: None,
            new_mode: Some(mode),
        }
    }

    fn deleted(path: String, id: ObjectId, mode: FileMode) -> Self {
        DiffEntry {
            change_type: ChangeType::Delete,
            old_path: Some(path),
            new_path: None,
            old_id: Some(id),
            new_id: None,
            old_mode: Some(mode),
            new_mode: None,
        }
    }

    fn modified(path: String, old: (ObjectId, FileMode), new: (ObjectId, FileMode)) -> Self {
        DiffEntry {
            change_type: ChangeType::Modify,
            old_path: Some(path.clone()),
            new_path: Some(path),
            old_id: Some(old.0),
            new_id: Some(new.0),
            old_mode: Some(old.1),
            new_mode: Some(new.1),
        }
    }
}

enum Work {
    /// Compare two trees under a common path prefix.
    Compare {
        prefix: String,
        old: ObjectId,
        new: ObjectId,
    },
    /// Every file under this tree is an addition or a deletion.
    Sweep {
        prefix: String,
        tree: ObjectId,
        change: ChangeType,
    },
}

/// Compute the ordered diff between two trees.
///
/// The result is sorted by path.
pub async fn diff_trees(
    reader: &StoreReader,
    old_tree: ObjectId,
    new_tree: ObjectId,
) -> StoreResult<Vec<DiffEntry>> {
    let mut out = Vec::new();
    let mut work = vec![Work::Compare {
        prefix: String::new(),
        old: old_tree,
        new: new_tree,
    }];

    while let Some(item) = work.pop() {
        match item {
            Work::Compare { prefix, old, new } => {
                if old == new {
                    continue;
                }
                let old_tree = reader.read_tree(&old).await?;
                let new_tree = reader.read_tree(&new).await?;
                compare_level(&prefix, &old_tree, &new_tree, &mut out, &mut work);
            }
            Work::Sweep {
                prefix,
                tree,
                change,
            } => {
                let tree = reader.read_tree(&tree).await?;
                sweep_level(&prefix, &tree, change, &mut out, &mut work);
            }
        }
    }

    // Work items are processed stack-wise, so entries arrive out of order;
    // canonical order is by path.
    out.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(out)
}

fn compare_level(
    prefix: &str,
    old: &Tree,
    new: &Tree,
    out: &mut Vec<DiffEntry>,
    work: &mut Vec<Work>,
) {
    let mut old_iter = old.entries.iter().peekable();
    let mut new_iter = new.entries.iter().peekable();

    loop {
        match (old_iter.peek(), new_iter.peek()) {
            (None, None) => break,
            (Some(o), None) => {
                one_sided(prefix, o.id, o.mode, &o.name, ChangeType::Delete, out, work);
                old_iter.next();
            }
            (None, Some(n)) => {
                one_sided(prefix, n.id, n.mode, &n.name, ChangeType::Add, out, work);
                new_iter.next();
            }
            (Some(o), Some(n)) => match o.name.cmp(&n.name) {
                std::cmp::Ordering::Less => {
                    one_sided(prefix, o.id, o.mode, &o.name, ChangeType::Delete, out, work);
                    old_iter.next();
                }
                std::cmp::Ordering::Greater => {
                    one_sided(prefix, n.id, n.mode, &n.name, ChangeType::Add, out, work);
                    new_iter.next();
                }
                std::cmp::Ordering::Equal => {
                    let path = join(prefix, &o.name);
                    if o.id != n.id || o.mode != n.mode {
                        match (o.mode.is_tree(), n.mode.is_tree()) {
                            (true, true) => work.push(Work::Compare {
                                prefix: path,
                                old: o.id,
                                new: n.id,
                            }),
                            (true, false) => {
                                work.push(Work::Sweep {
                                    prefix: path.clone(),
                                    tree: o.id,
                                    change: ChangeType::Delete,
                                });
                                out.push(DiffEntry::added(path, n.id, n.mode));
                            }
                            (false, true) => {
                                out.push(DiffEntry::deleted(path.clone(), o.id, o.mode));
                                work.push(Work::Sweep {
                                    prefix: path,
                                    tree: n.id,
                                    change: ChangeType::Add,
                                });
                            }
                            (false, false) => {
                                out.push(DiffEntry::modified(
                                    path,
                                    (o.id, o.mode),
                                    (n.id, n.mode),
                                ));
                            }
                        }
                    }
                    old_iter.next();
                    new_iter.next();
                }
            },
        }
    }
}

fn sweep_level(
    prefix: &str,
    tree: &Tree,
    change: ChangeType,
    out: &mut Vec<DiffEntry>,
    work: &mut Vec<Work>,
) {
    for entry in &tree.entries {
        one_sided(prefix, entry.id, entry.mode, &entry.name, change, out, work);
    }
}

fn one_sided(
    prefix: &str,
    id: ObjectId,
    mode: FileMode,
    name: &str,
    change: ChangeType,
    out: &mut Vec<DiffEntry>,
    work: &mut Vec<Work>,
) {
    let path = join(prefix, name);
    if mode.is_tree() {
        work.push(Work::Sweep {
            prefix: path,
            tree: id,
            change,
        });
    } else {
        out.push(match change {
            ChangeType::Add => DiffEntry::added(path, id, mode),
            _ => DiffEntry::deleted(path, id, mode),
        });
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
