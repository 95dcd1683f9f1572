//! Object-store backends.
//!
//! The file system treats the object database as an opaque collaborator: it
//! can read blobs, parse commits and trees, enumerate direct refs and resolve
//! a ref to its tip. Two stores are provided, one in memory and one on disk;
//! both share the stored object model of [`crate::repository`].

mod fs_store;
mod memory_store;
mod object_store;
mod reader;
mod tree_diff;

pub use fs_store::FsObjectStore;
pub use memory_store::{BuildError, CommitRecorder, MemoryObjectStore, MemoryStoreBuilder};
pub use object_store::{ObjectStore, StoreError, StoreResult};
pub use reader::StoreReader;
pub use tree_diff::{diff_trees, ChangeType, DiffEntry};
