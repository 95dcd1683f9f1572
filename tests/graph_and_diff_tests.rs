//! Commit graph, parents, refs and diffs through the file-system surface.

use std::collections::HashSet;
use std::sync::Arc;

use gitjfs_rs::{
    ChangeType, GitFileSystem, GitFileSystems, GitFsError, MemoryStoreBuilder, ObjectId,
};

/// Linear history C1 <- C2 <- C3 <- C4 on refs/heads/main.
fn linear_fixture(name: &str) -> (GitFileSystems, Arc<GitFileSystem>, [ObjectId; 4]) {
    let mut builder = MemoryStoreBuilder::new(name);
    let c1 = builder
        .commit()
        .file("file1", &b"one"[..])
        .unwrap()
        .message("c1")
        .write()
        .unwrap();
    let c2 = builder
        .commit()
        .file("file1", &b"one"[..])
        .unwrap()
        .file("file2", &b"two"[..])
        .unwrap()
        .parent(c1)
        .message("c2")
        .write()
        .unwrap();
    let c3 = builder
        .commit()
        .file("file1", &b"one"[..])
        .unwrap()
        .file("file2", &b"two changed"[..])
        .unwrap()
        .file("dir/file", &b"three"[..])
        .unwrap()
        .parent(c2)
        .message("c3")
        .write()
        .unwrap();
    let c4 = builder
        .commit()
        .file("file1", &b"one"[..])
        .unwrap()
        .parent(c3)
        .message("c4")
        .write()
        .unwrap();
    builder.set_ref("refs/heads/main", c4).unwrap();

    let registry = GitFileSystems::new();
    let fs = registry.open_in_memory(Arc::new(builder.build())).unwrap();
    (registry, fs, [c1, c2, c3, c4])
}

#[tokio::test]
async fn test_parents_and_graph_nodes() {
    let (_registry, fs, [c1, c2, c3, c4]) = linear_fixture("parents");

    let parents_of_c1 = fs.parent_commits(&fs.get_path_root(c1)).await.unwrap();
    assert!(parents_of_c1.is_empty());

    let parents_of_c4 = fs.parent_commits(&fs.get_path_root(c4)).await.unwrap();
    assert_eq!(parents_of_c4.len(), 1);
    assert_eq!(parents_of_c4[0], fs.get_path_root(c3));

    let graph = fs.graph().await.unwrap();
    let ids: HashSet<ObjectId> = graph.nodes().map(|node| node.id).collect();
    assert_eq!(ids, HashSet::from([c1, c2, c3, c4]));
    assert_eq!(graph.parents_of(&c3), Some(&[c2][..]));
    assert_eq!(graph.children_of(&c2), &[c3]);

    fs.close().unwrap();
}

#[tokio::test]
async fn test_graph_is_memoized() {
    let (_registry, fs, _commits) = linear_fixture("graph-memo");

    let first = fs.graph().await.unwrap();
    let second = fs.graph().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_refs_and_root_directories() {
    let (_registry, fs, [c1, c2, c3, c4]) = linear_fixture("refs");

    let refs = fs.refs().await.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].to_string(), "/refs/heads/main//");

    let roots = fs.root_directories().await.unwrap();
    let ids: HashSet<ObjectId> = roots
        .iter()
        .filter_map(|root| root.revision().and_then(|rev| rev.commit_id()))
        .collect();
    assert_eq!(ids, HashSet::from([c1, c2, c3, c4]));
    assert!(roots.iter().all(|root| root.is_root()));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_commit_of_carries_metadata() {
    let (_registry, fs, [c1, _c2, _c3, c4]) = linear_fixture("commit-of");

    let node = fs.commit_of(&fs.get_path_root(c4)).await.unwrap();
    assert_eq!(node.id, c4);
    assert_eq!(node.parents.len(), 1);
    assert_eq!(node.author.name, "gitjfs");

    let initial = fs.commit_of(&fs.get_path_root(c1)).await.unwrap();
    assert!(initial.parents.is_empty());

    let missing = fs.commit_of(&fs.get_path_root(ObjectId::zero())).await;
    assert!(matches!(missing, Err(GitFsError::NoSuchFile { .. })));

    let not_a_root = fs.get_path("dir", &[]).unwrap();
    assert!(matches!(
        fs.commit_of(&not_a_root).await,
        Err(GitFsError::IllegalArgument { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_ref_based_root_resolves_through_ref() {
    let (_registry, fs, [_c1, _c2, _c3, c4]) = linear_fixture("ref-root");

    let main = fs.get_path_root_ref("/refs/heads/main/").unwrap();
    let node = fs.commit_of(&main).await.unwrap();
    assert_eq!(node.id, c4);

    let missing = fs.get_path_root_ref("/refs/heads/other/").unwrap();
    assert!(matches!(
        fs.commit_of(&missing).await,
        Err(GitFsError::NoSuchFile { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_diff_scenarios() {
    let (_registry, fs, [c1, c2, c3, _c4]) = linear_fixture("diff");

    let r1 = fs.get_path_root(c1);
    let r2 = fs.get_path_root(c2);
    let r3 = fs.get_path_root(c3);

    let forward = fs.diff(&r1, &r2).await.unwrap();
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].change_type, ChangeType::Add);
    assert_eq!(forward[0].path(), "file2");

    let backward = fs.diff(&r2, &r1).await.unwrap();
    assert_eq!(backward.len(), 1);
    assert_eq!(backward[0].change_type, ChangeType::Delete);
    assert_eq!(backward[0].path(), "file2");

    let combined = fs.diff(&r1, &r3).await.unwrap();
    let summary: Vec<(ChangeType, &str)> = combined
        .iter()
        .map(|entry| (entry.change_type, entry.path()))
        .collect();
    assert_eq!(
        summary,
        vec![(ChangeType::Add, "dir/file"), (ChangeType::Add, "file2")]
    );

    fs.close().unwrap();
}

#[tokio::test]
async fn test_diff_of_a_commit_with_itself_is_empty() {
    let (_registry, fs, [c1, _c2, _c3, _c4]) = linear_fixture("diff-self");

    let r1 = fs.get_path_root(c1);
    assert!(fs.diff(&r1, &r1).await.unwrap().is_empty());

    fs.close().unwrap();
}

#[tokio::test]
async fn test_diff_inverse_symmetry() {
    let (_registry, fs, [c1, _c2, c3, _c4]) = linear_fixture("diff-symmetry");

    let r1 = fs.get_path_root(c1);
    let r3 = fs.get_path_root(c3);

    let forward = fs.diff(&r1, &r3).await.unwrap();
    let backward = fs.diff(&r3, &r1).await.unwrap();
    assert_eq!(forward.len(), backward.len());
    for entry in &forward {
        let inverse_type = match entry.change_type {
            ChangeType::Add => ChangeType::Delete,
            ChangeType::Delete => ChangeType::Add,
            other => other,
        };
        assert!(
            backward
                .iter()
                .any(|b| b.change_type == inverse_type && b.path() == entry.path()),
            "no inverse for {:?} {}",
            entry.change_type,
            entry.path()
        );
    }

    fs.close().unwrap();
}

#[tokio::test]
async fn test_diff_requires_path_roots_of_this_instance() {
    let (_registry, fs, [c1, c2, _c3, _c4]) = linear_fixture("diff-arguments");
    let (_other_registry, other_fs, _other) = linear_fixture("diff-arguments-other");

    let not_a_root = fs.get_path("dir", &[]).unwrap();
    assert!(matches!(
        fs.diff(&not_a_root, &fs.get_path_root(c2)).await,
        Err(GitFsError::IllegalArgument { .. })
    ));

    let foreign = other_fs.get_path_root(c1);
    assert!(matches!(
        fs.diff(&foreign, &fs.get_path_root(c2)).await,
        Err(GitFsError::IllegalArgument { .. })
    ));

    fs.close().unwrap();
    other_fs.close().unwrap();
}

#[tokio::test]
async fn test_unreachable_commit_is_refused() {
    let mut builder = MemoryStoreBuilder::new("unreachable");
    let reachable = builder
        .commit()
        .file("a", &b"kept"[..])
        .unwrap()
        .write()
        .unwrap();
    let orphan = builder
        .commit()
        .file("b", &b"dropped"[..])
        .unwrap()
        .write()
        .unwrap();
    builder.set_ref("refs/heads/main", reachable).unwrap();
    let registry = GitFileSystems::new();
    let fs = registry.open_in_memory(Arc::new(builder.build())).unwrap();

    let kept = fs.get_absolute_path(&format!("/{}//a", reachable), &[]).unwrap();
    assert_eq!(&fs.read(&kept).await.unwrap()[..], b"kept");

    let dropped = fs.get_absolute_path(&format!("/{}//b", orphan), &[]).unwrap();
    assert!(matches!(
        fs.read(&dropped).await,
        Err(GitFsError::NoSuchFile { .. })
    ));

    fs.close().unwrap();
}
