//! gitjfs-rs - read-only, hierarchical file-system views over git-style
//! repositories.
//!
//! A repository is exposed as a file system addressed by logical paths of
//! the form `<root>//<internal>`, where the root names a commit directly
//! (40-hex id) or through a ref under `refs/`, and the internal part is a
//! POSIX-style path within that commit's tree. Clients read bytes, list
//! directories, resolve links, walk the commit graph and diff commits
//! without ever touching a working copy.

pub mod backend;
pub mod cli;
pub mod error;
pub mod fs;
pub mod path;
pub mod registry;
pub mod repository;

pub use error::{GitFsError, Result};

pub use backend::{
    diff_trees, ChangeType, DiffEntry, FsObjectStore, MemoryObjectStore, MemoryStoreBuilder,
    ObjectStore, StoreError, StoreReader,
};
pub use fs::{
    AccessMode, BasicFileAttributes, BlobChannel, CommitGraph, CommitNode, FollowLinks,
    GitDirectoryIter, GitDirectoryStream, GitFileSystem, GitObjectRef, OpenOption,
};
pub use path::{GitPath, GitRev, InternalPath, DEFAULT_REF};
pub use registry::GitFileSystems;
pub use repository::{Commit, FileMode, ObjectId, Signature, Tree, TreeEntry};
