//! Corrupted-mount detection.
//!
//! A staging or publish path that was mounted in a previous life may be left
//! behind as a stale remote-mount handle or a dangling symlink. The checker
//! classifies the path before the stage step reuses it. Diagnostic predicate
//! only: every inspection failure folds into the boolean, nothing is raised.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// True when `dir` exists but is unusable as a mount point.
///
/// Absence is not corruption: a path that does not exist returns false, as
/// does a healthy accessible directory. A path whose stat fails like a stale
/// remote handle, or a symlink whose target is gone, returns true.
pub fn is_corrupted_dir(dir: &Path) -> bool {
    match fs::symlink_metadata(dir) {
        // Path absent entirely.
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        // Entry exists but cannot be inspected (ESTALE/ENOTCONN class).
        Err(e) => {
            tracing::debug!(path = %dir.display(), error = %e, "mount point stat failed");
            true
        }
        Ok(_) => match fs::metadata(dir) {
            Ok(_) => false,
            // Entry present but target unreachable: dangling symlink or a
            // mount whose server side went away.
            Err(e) => {
                tracing::debug!(path = %dir.display(), error = %e, "mount point target unreachable");
                is_corruption_errno(&e)
            }
        },
    }
}

/// Classify a follow-the-link stat failure.
///
/// NotFound here means the entry exists but its target is gone (the absent
/// case was already handled), which is the dangling-symlink signature.
fn is_corruption_errno(err: &std::io::Error) -> bool {
    if err.kind() == ErrorKind::NotFound {
        return true;
    }
    matches!(
        err.raw_os_error(),
        Some(libc::ENOTCONN) | Some(libc::ESTALE) | Some(libc::EIO) | Some(libc::EACCES)
            | Some(libc::ELOOP)
    )
}
