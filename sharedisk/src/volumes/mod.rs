//! VHD block volume management.
//!
//! - `lock` - keyed async locks serializing work per resource
//! - `vhd` - stage/attach/format/unstage state machine for loop-backed volumes

pub mod lock;
pub mod vhd;

pub use lock::LockRegistry;
pub use vhd::{VhdFile, VhdManager};
