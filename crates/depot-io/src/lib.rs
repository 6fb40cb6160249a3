//! # depot-io: volume abstraction
//!
//! Byte-level read/write/delete over one mounted filesystem subtree, with
//! sharded physical paths, path sanitization against traversal, and a
//! health probe used both at pool-admission time and by the reconciler.

mod error;
mod path;
mod volume;

pub use error::VolumeError;
pub use path::{extension_of, relative_physical_path, resolve_under_root, sanitize_component};
pub use volume::Volume;
