//! Network share mount plumbing.
//!
//! - `options` - mount option builder filling in documented defaults
//! - `health` - corrupted-mount detection before reusing a mount point
//! - `host` - blocking mount/loop/format primitives behind the [`host::HostOps`] seam

pub mod health;
pub mod host;
pub mod options;

pub use health::is_corrupted_dir;
pub use host::HostOps;
pub use options::append_default_mount_options;
