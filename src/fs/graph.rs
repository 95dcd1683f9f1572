//! The commit graph: every commit reachable from any `refs/…` entry.

use std::collections::HashMap;

use crate::backend::{StoreReader, StoreResult};
use crate::repository::{ObjectId, Signature};

/// One commit in the graph, with its metadata parsed eagerly.
///
/// Equality is over all fields, so two nodes that collide on id but differ
/// elsewhere never compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitNode {
    /// The commit id.
    pub id: ObjectId,
    /// Author of the changes.
    pub author: Signature,
    /// Person who created the commit.
    pub committer: Signature,
    /// Parent commit ids, ordered.
    pub parents: Vec<ObjectId>,
}

/// An immutable directed graph over commits, edges from child to parent.
///
/// Commits unreachable from every ref are excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitGraph {
    nodes: HashMap<ObjectId, CommitNode>,
    children: HashMap<ObjectId, Vec<ObjectId>>,
}

impl CommitGraph {
    /// Walk every `refs/…` tip and collect all reachable commits.
    pub(crate) async fn build(reader: &StoreReader) -> StoreResult<CommitGraph> {
        let mut nodes: HashMap<ObjectId, CommitNode> = HashMap::new();
        let mut stack: Vec<ObjectId> = reader
            .refs("refs/")
            .await?
            .into_iter()
            .map(|(_, id)| id)
            .collect();

        while let Some(id) = stack.pop() {
            if nodes.contains_key(&id) {
                continue;
            }
            let commit = reader.read_commit(&id).await?;
            stack.extend(commit.parents.iter().copied());
            nodes.insert(
                id,
                CommitNode {
                    id,
                    author: commit.author.clone(),
                    committer: commit.committer.clone(),
                    parents: commit.parents.clone(),
                },
            );
        }

        let mut children: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for node in nodes.values() {
            for parent in &node.parents {
                children.entry(*parent).or_default().push(node.id);
            }
        }
        for list in children.values_mut() {
            list.sort();
        }

        Ok(CommitGraph { nodes, children })
    }

    /// The number of commits in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no commits at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the given commit is in the graph.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The node for the given commit.
    pub fn get(&self, id: &ObjectId) -> Option<&CommitNode> {
        self.nodes.get(id)
    }

    /// Iterate over all nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &CommitNode> {
        self.nodes.values()
    }

    /// The parents of a commit: the targets of its outgoing edges.
    pub fn parents_of(&self, id: &ObjectId) -> Option<&[ObjectId]> {
        self.nodes.get(id).map(|node| node.parents.as_slice())
    }

    /// The children of a commit: the sources of its incoming edges, sorted.
    pub fn children_of(&self, id: &ObjectId) -> &[ObjectId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStoreBuilder;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_linear_history() {
        let mut builder = MemoryStoreBuilder::new("test");
        let c1 = builder
            .commit()
            .file("a", &b"1"[..])
            .unwrap()
            .write()
            .unwrap();
        let c2 = builder
            .commit()
            .file("a", &b"2"[..])
            .unwrap()
            .parent(c1)
            .write()
            .unwrap();
        let c3 = builder
            .commit()
            .file("a", &b"3"[..])
            .unwrap()
            .parent(c2)
            .write()
            .unwrap();
        builder.set_ref("refs/heads/main", c3).unwrap();
        let reader = StoreReader::new(Arc::new(builder.build()), false);

        let graph = CommitGraph::build(&reader).await.unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.parents_of(&c1), Some(&[][..]));
        assert_eq!(graph.parents_of(&c3), Some(&[c2][..]));
        assert_eq!(graph.children_of(&c1), &[c2]);
        assert_eq!(graph.children_of(&c3), &[] as &[ObjectId]);
    }

    #[tokio::test]
    async fn test_unreachable_commits_are_excluded() {
        let mut builder = MemoryStoreBuilder::new("test");
        let reachable = builder
            .commit()
            .file("a", &b"1"[..])
            .unwrap()
            .write()
            .unwrap();
        let orphan = builder
            .commit()
            .file("b", &b"2"[..])
            .unwrap()
            .write()
            .unwrap();
        builder.set_ref("refs/heads/main", reachable).unwrap();
        let reader = StoreReader::new(Arc::new(builder.build()), false);

        let graph = CommitGraph::build(&reader).await.unwrap();
        assert!(graph.contains(&reachable));
        assert!(!graph.contains(&orphan));
    }

    #[tokio::test]
    async fn test_merge_commit_keeps_parent_order() {
        let mut builder = MemoryStoreBuilder::new("test");
        let left = builder
            .commit()
            .file("a", &b"left"[..])
            .unwrap()
            .write()
            .unwrap();
        let right = builder
            .commit()
            .file("a", &b"right"[..])
            .unwrap()
            .write()
            .unwrap();
        let merge = builder
            .commit()
            .file("a", &b"merged"[..])
            .unwrap()
            .parent(left)
            .parent(right)
            .write()
            .unwrap();
        builder.set_ref("refs/heads/main", merge).unwrap();
        let reader = StoreReader::new(Arc::new(builder.build()), false);

        let graph = CommitGraph::build(&reader).await.unwrap();
        assert_eq!(graph.parents_of(&merge), Some(&[left, right][..]));
    }

    #[tokio::test]
    async fn test_empty_graph_without_refs() {
        let builder = MemoryStoreBuilder::new("test");
        let reader = StoreReader::new(Arc::new(builder.build()), false);
        let graph = CommitGraph::build(&reader).await.unwrap();
        assert!(graph.is_empty());
    }
}
