//! Stored object model for git-style repositories.

mod git_objects;

pub use git_objects::{
    blob_object_id, from_json, structured_object_id, to_canonical_json, Commit, FileMode,
    ObjectError, ObjectId, Signature, StoredObject, Tree, TreeEntry, OBJECT_ID_LEN,
};
