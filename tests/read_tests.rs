//! Read operations against in-memory repositories: byte channels, link
//! following, attributes, directory streams.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use chrono::DateTime;

use gitjfs_rs::{
    AccessMode, GitFileSystem, GitFileSystems, GitFsError, MemoryStoreBuilder, ObjectId,
    OpenOption, Signature,
};

fn signature() -> Signature {
    Signature {
        name: "Jane Doe".to_string(),
        email: "jane@example.com".to_string(),
        when: DateTime::parse_from_rfc3339("2024-01-15T10:30:00+01:00").unwrap(),
    }
}

/// One commit with a small file, a link to it, an executable, an absolute
/// link and a cycling link, on refs/heads/main.
fn fixture(name: &str) -> (GitFileSystems, Arc<GitFileSystem>, ObjectId) {
    let mut builder = MemoryStoreBuilder::new(name);
    let commit = builder
        .commit()
        .file("file1.txt", &b"Hello, world"[..])
        .unwrap()
        .symlink("link.txt", "file1.txt")
        .unwrap()
        .symlink("abs", "/etc/x")
        .unwrap()
        .symlink("dir/cyclingLink", "../dir/cyclingLink")
        .unwrap()
        .exec("run.sh", &b"#!/bin/sh"[..])
        .unwrap()
        .file("dir/nested.txt", &b"nested"[..])
        .unwrap()
        .committer(signature())
        .author(signature())
        .message("initial")
        .write()
        .unwrap();
    builder.set_ref("refs/heads/main", commit).unwrap();

    let registry = GitFileSystems::new();
    let fs = registry.open_in_memory(Arc::new(builder.build())).unwrap();
    (registry, fs, commit)
}

async fn read_string(fs: &Arc<GitFileSystem>, path: &gitjfs_rs::GitPath) -> String {
    let bytes = fs.read(path).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_basic_read() {
    let (_registry, fs, commit) = fixture("basic-read");

    let relative = fs.get_relative_path(&["file1.txt"]).unwrap();
    assert_eq!(read_string(&fs, &relative).await, "Hello, world");

    let dotted = fs.get_relative_path(&["./file1.txt"]).unwrap();
    assert_eq!(read_string(&fs, &dotted).await, "Hello, world");

    let absolute = fs
        .get_absolute_path(&format!("/{}//file1.txt", commit), &[])
        .unwrap();
    assert_eq!(read_string(&fs, &absolute).await, "Hello, world");

    fs.close().unwrap();
}

#[tokio::test]
async fn test_missing_file() {
    let (_registry, fs, commit) = fixture("missing-file");

    let missing = fs
        .get_absolute_path(&format!("/{}//file2.txt", commit), &[])
        .unwrap();
    assert!(!fs.exists(&missing, true).await.unwrap());
    assert!(matches!(
        fs.read(&missing).await,
        Err(GitFsError::NoSuchFile { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_byte_channel_random_access() {
    let (_registry, fs, _commit) = fixture("byte-channel");

    let path = fs.get_relative_path(&["file1.txt"]).unwrap();
    let mut channel = fs
        .new_byte_channel(&path, &[OpenOption::Read])
        .await
        .unwrap();
    assert_eq!(channel.size(), 12);
    channel.seek(SeekFrom::Start(7)).unwrap();
    let mut buf = String::new();
    channel.read_to_string(&mut buf).unwrap();
    assert_eq!(buf, "world");

    fs.close().unwrap();
}

#[tokio::test]
async fn test_byte_channel_refuses_writes_and_directories() {
    let (_registry, fs, _commit) = fixture("byte-channel-refusals");

    let path = fs.get_relative_path(&["file1.txt"]).unwrap();
    assert!(matches!(
        fs.new_byte_channel(&path, &[OpenOption::Write]).await,
        Err(GitFsError::ReadOnlyFileSystem)
    ));

    let dir = fs.get_relative_path(&["dir"]).unwrap();
    assert!(matches!(
        fs.new_byte_channel(&dir, &[OpenOption::Read]).await,
        Err(GitFsError::IsADirectory { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_link_follow() {
    let (_registry, fs, _commit) = fixture("link-follow");

    let link = fs.get_relative_path(&["link.txt"]).unwrap();
    assert_eq!(read_string(&fs, &link).await, "Hello, world");

    assert!(matches!(
        fs.new_byte_channel(&link, &[OpenOption::Read, OpenOption::NoFollowLinks])
            .await,
        Err(GitFsError::PathCouldNotBeFound { .. })
    ));

    let target = fs.read_symbolic_link(&link).await.unwrap();
    assert!(!target.is_absolute());
    assert_eq!(target.to_string(), "file1.txt");

    let not_a_link = fs.get_relative_path(&["file1.txt"]).unwrap();
    assert!(matches!(
        fs.read_symbolic_link(&not_a_link).await,
        Err(GitFsError::NotALink { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_cycling_link() {
    let (_registry, fs, _commit) = fixture("cycling-link");

    let cycling = fs.get_relative_path(&["dir/cyclingLink"]).unwrap();
    assert!(!fs.exists(&cycling, true).await.unwrap());
    assert!(fs.exists(&cycling, false).await.unwrap());

    let attributes = fs.read_attributes(&cycling, false).await.unwrap();
    assert!(attributes.is_symbolic_link());

    fs.close().unwrap();
}

#[tokio::test]
async fn test_absolute_link() {
    let (_registry, fs, _commit) = fixture("absolute-link");

    let abs = fs.get_relative_path(&["abs"]).unwrap();
    match fs.read_symbolic_link(&abs).await {
        Err(GitFsError::AbsoluteLink { target }) => assert_eq!(target, "/etc/x"),
        other => panic!("expected an absolute-link failure, got {:?}", other.map(|p| p.to_string())),
    }
    assert!(matches!(
        fs.read(&abs).await,
        Err(GitFsError::PathCouldNotBeFound { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_read_attributes() {
    let (_registry, fs, _commit) = fixture("attributes");

    let file = fs.get_relative_path(&["file1.txt"]).unwrap();
    let attributes = fs.read_attributes(&file, true).await.unwrap();
    assert_eq!(attributes.size(), 12);
    assert!(attributes.is_regular_file());
    assert!(!attributes.is_directory());
    assert!(!attributes.is_symbolic_link());
    assert!(!attributes.is_other());
    assert_eq!(attributes.last_modified_time(), signature().when);
    assert_eq!(attributes.creation_time(), signature().when);

    let dir = fs.get_relative_path(&["dir"]).unwrap();
    assert!(fs.read_attributes(&dir, true).await.unwrap().is_directory());

    let link = fs.get_relative_path(&["link.txt"]).unwrap();
    let followed = fs.read_attributes(&link, true).await.unwrap();
    assert!(followed.is_regular_file());
    let unfollowed = fs.read_attributes(&link, false).await.unwrap();
    assert!(unfollowed.is_symbolic_link());

    fs.close().unwrap();
}

#[tokio::test]
async fn test_to_real_path() {
    let (_registry, fs, _commit) = fixture("real-path");

    let link = fs.get_relative_path(&["link.txt"]).unwrap();
    let real = fs.to_real_path(&link, true).await.unwrap();
    assert!(real.is_absolute());
    assert_eq!(real.to_string(), "/refs/heads/main//file1.txt");

    assert!(matches!(
        fs.to_real_path(&link, false).await,
        Err(GitFsError::PathCouldNotBeFound { .. })
    ));

    let plain = fs.get_relative_path(&["dir/nested.txt"]).unwrap();
    let real = fs.to_real_path(&plain, false).await.unwrap();
    assert_eq!(real.to_string(), "/refs/heads/main//dir/nested.txt");

    fs.close().unwrap();
}

#[tokio::test]
async fn test_check_access() {
    let (_registry, fs, _commit) = fixture("check-access");

    let file = fs.get_relative_path(&["file1.txt"]).unwrap();
    fs.check_access(&file, &[AccessMode::Read]).await.unwrap();
    assert!(matches!(
        fs.check_access(&file, &[AccessMode::Write]).await,
        Err(GitFsError::ReadOnlyFileSystem)
    ));
    assert!(matches!(
        fs.check_access(&file, &[AccessMode::Execute]).await,
        Err(GitFsError::AccessDenied { .. })
    ));

    let script = fs.get_relative_path(&["run.sh"]).unwrap();
    fs.check_access(&script, &[AccessMode::Read, AccessMode::Execute])
        .await
        .unwrap();

    let missing = fs.get_relative_path(&["nope"]).unwrap();
    assert!(matches!(
        fs.check_access(&missing, &[AccessMode::Read]).await,
        Err(GitFsError::NoSuchFile { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_directory_stream_lists_entries() {
    let (_registry, fs, _commit) = fixture("dir-stream");

    let root = fs.get_relative_path(&[""]).unwrap();
    let stream = fs.new_directory_stream(&root, None).await.unwrap();
    let mut iter = stream.iterator().unwrap();

    let mut names = Vec::new();
    while let Some(entry) = iter.next().unwrap() {
        assert!(!entry.is_absolute(), "a relative base yields relative entries");
        names.push(entry.to_string());
    }
    assert_eq!(
        names,
        vec!["abs", "dir", "file1.txt", "link.txt", "run.sh"]
    );

    assert!(matches!(
        stream.iterator(),
        Err(GitFsError::IllegalState { .. })
    ));
    stream.close();

    fs.close().unwrap();
}

#[tokio::test]
async fn test_directory_stream_filter_and_read_ahead() {
    let (_registry, fs, _commit) = fixture("dir-stream-filter");

    let root = fs.get_relative_path(&[""]).unwrap();
    let stream = fs
        .new_directory_stream(
            &root,
            Some(Box::new(|path| Ok(path.to_string().ends_with(".txt")))),
        )
        .await
        .unwrap();
    let mut iter = stream.iterator().unwrap();

    assert!(iter.has_next().unwrap());
    // The read-ahead element survives closing the stream.
    stream.close();
    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.to_string(), "file1.txt");
    assert!(!iter.has_next().unwrap());
    assert_eq!(iter.next().unwrap(), None);

    fs.close().unwrap();
}

#[tokio::test]
async fn test_directory_stream_on_file_fails() {
    let (_registry, fs, _commit) = fixture("dir-stream-not-dir");

    let file = fs.get_relative_path(&["file1.txt"]).unwrap();
    assert!(matches!(
        fs.new_directory_stream(&file, None).await,
        Err(GitFsError::NotADirectory { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_directory_stream_absolute_base() {
    let (_registry, fs, commit) = fixture("dir-stream-absolute");

    let dir = fs
        .get_absolute_path(&format!("/{}//dir", commit), &[])
        .unwrap();
    let stream = fs.new_directory_stream(&dir, None).await.unwrap();
    let mut iter = stream.iterator().unwrap();
    let mut names = Vec::new();
    while let Some(entry) = iter.next().unwrap() {
        assert!(entry.is_absolute());
        names.push(entry.to_string());
    }
    assert_eq!(
        names,
        vec![
            format!("/{}//dir/cyclingLink", commit),
            format!("/{}//dir/nested.txt", commit),
        ]
    );

    fs.close().unwrap();
}

#[tokio::test]
async fn test_listed_entries_read_without_another_walk() {
    let (_registry, fs, _commit) = fixture("dir-stream-seeded");

    let root = fs.get_relative_path(&[""]).unwrap();
    let stream = fs.new_directory_stream(&root, None).await.unwrap();
    let mut iter = stream.iterator().unwrap();
    while let Some(entry) = iter.next().unwrap() {
        // Attribute reads on yielded entries use the pre-seeded objects.
        let attributes = fs.read_attributes(&entry, false).await.unwrap();
        let name = entry.file_name().unwrap().to_string();
        match name.as_str() {
            "dir" => assert!(attributes.is_directory()),
            "abs" | "link.txt" => assert!(attributes.is_symbolic_link()),
            _ => assert!(attributes.is_regular_file()),
        }
    }

    fs.close().unwrap();
}

#[tokio::test]
async fn test_read_through_link_directory() {
    let mut builder = MemoryStoreBuilder::new("link-dir");
    let commit = builder
        .commit()
        .file("real/file.txt", &b"via link"[..])
        .unwrap()
        .symlink("alias", "real")
        .unwrap()
        .write()
        .unwrap();
    builder.set_ref("refs/heads/main", commit).unwrap();
    let registry = GitFileSystems::new();
    let fs = registry.open_in_memory(Arc::new(builder.build())).unwrap();

    let through = fs.get_relative_path(&["alias/file.txt"]).unwrap();
    assert_eq!(read_string(&fs, &through).await, "via link");

    let real = fs.to_real_path(&through, true).await.unwrap();
    assert_eq!(real.to_string(), "/refs/heads/main//real/file.txt");

    fs.close().unwrap();
}

#[tokio::test]
async fn test_write_operations_fail_read_only() {
    let (_registry, fs, _commit) = fixture("write-refusals");

    let path = fs.get_relative_path(&["file1.txt"]).unwrap();
    let other = fs.get_relative_path(&["other"]).unwrap();
    assert!(matches!(
        fs.create_directory(&other),
        Err(GitFsError::ReadOnlyFileSystem)
    ));
    assert!(matches!(
        fs.delete(&path),
        Err(GitFsError::ReadOnlyFileSystem)
    ));
    assert!(matches!(
        fs.copy(&path, &other),
        Err(GitFsError::ReadOnlyFileSystem)
    ));
    assert!(matches!(
        fs.set_attribute(&path, "basic:lastModifiedTime"),
        Err(GitFsError::ReadOnlyFileSystem)
    ));
    assert!(matches!(
        fs.is_hidden(&path),
        Err(GitFsError::Unsupported { .. })
    ));
    assert!(matches!(
        fs.new_watch_service(),
        Err(GitFsError::Unsupported { .. })
    ));

    fs.close().unwrap();
}

#[tokio::test]
async fn test_closed_file_system_refuses_reads() {
    let (_registry, fs, _commit) = fixture("closed");

    let path = fs.get_relative_path(&["file1.txt"]).unwrap();
    fs.close().unwrap();
    assert!(!fs.is_open());

    assert!(matches!(
        fs.read(&path).await,
        Err(GitFsError::ClosedFileSystem)
    ));
    assert!(matches!(
        fs.exists(&path, true).await,
        Err(GitFsError::ClosedFileSystem)
    ));
    assert!(matches!(
        fs.graph().await,
        Err(GitFsError::ClosedFileSystem)
    ));

    // Paths can still be constructed and rendered.
    assert_eq!(path.to_string(), "file1.txt");
}

#[tokio::test]
async fn test_sha_rooted_paths_are_stable() {
    let mut builder = MemoryStoreBuilder::new("sha-rooted");
    let c1 = builder
        .commit()
        .file("file.txt", &b"one"[..])
        .unwrap()
        .write()
        .unwrap();
    let c2 = builder
        .commit()
        .file("file.txt", &b"two"[..])
        .unwrap()
        .parent(c1)
        .write()
        .unwrap();
    builder.set_ref("refs/heads/main", c2).unwrap();
    let registry = GitFileSystems::new();
    let fs = registry.open_in_memory(Arc::new(builder.build())).unwrap();

    let at_c1 = fs.get_absolute_path(&format!("/{}//file.txt", c1), &[]).unwrap();
    let at_c2 = fs.get_absolute_path(&format!("/{}//file.txt", c2), &[]).unwrap();
    assert_eq!(read_string(&fs, &at_c1).await, "one");
    assert_eq!(read_string(&fs, &at_c2).await, "two");
    // Repeated reads hit the per-path cache and stay stable.
    assert_eq!(read_string(&fs, &at_c1).await, "one");

    fs.close().unwrap();
}

#[tokio::test]
async fn test_ref_update_invalidates_cached_resolution() {
    let mut builder = MemoryStoreBuilder::new("moving-ref");
    let c1 = builder
        .commit()
        .file("file.txt", &b"one"[..])
        .unwrap()
        .write()
        .unwrap();
    let c2 = builder
        .commit()
        .file("file.txt", &b"two"[..])
        .unwrap()
        .parent(c1)
        .write()
        .unwrap();
    builder.set_ref("refs/heads/main", c1).unwrap();
    let registry = GitFileSystems::new();
    let store = Arc::new(builder.build());
    let fs = registry.open_in_memory(Arc::clone(&store)).unwrap();

    let on_main = fs.get_relative_path(&["file.txt"]).unwrap();
    assert_eq!(read_string(&fs, &on_main).await, "one");

    // The ref moves out of band; the observed-sha check invalidates the
    // cached object on the next resolution of the same path.
    store.update_ref("refs/heads/main", c2).unwrap();
    assert_eq!(read_string(&fs, &on_main).await, "two");

    fs.close().unwrap();
}
