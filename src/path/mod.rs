//! The path model: revision tokens, the internal path algebra, and logical
//! paths binding the two to a file-system instance.

mod internal;
mod logical;
mod revision;

pub use internal::InternalPath;
pub use logical::GitPath;
pub use revision::{GitRev, DEFAULT_REF};
