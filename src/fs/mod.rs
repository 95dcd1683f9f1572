//! The file-system instance and its read operations.

mod attributes;
mod byte_channel;
mod dir_stream;
mod file_system;
mod graph;
mod resolver;

pub use attributes::BasicFileAttributes;
pub use byte_channel::BlobChannel;
pub use dir_stream::{DirectoryFilter, GitDirectoryIter, GitDirectoryStream};
pub use file_system::{AccessMode, GitFileSystem, OpenOption};
pub use graph::{CommitGraph, CommitNode};
pub use resolver::{FollowLinks, GitObjectRef};
