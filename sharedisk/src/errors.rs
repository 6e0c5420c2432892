//! Error types for the sharedisk driver.
//!
//! Every fallible operation in the crate returns [`SharediskResult`]. The
//! error kinds are stable: the orchestration layer matches on them to decide
//! whether a request is retryable (provider/host failures) or a caller
//! defect (parse and validation errors, never retried).

use thiserror::Error;

/// Result alias used throughout the crate.
pub type SharediskResult<T> = Result<T, SharediskError>;

/// Driver error taxonomy.
#[derive(Error, Debug)]
pub enum SharediskError {
    /// Malformed volume identifier or option string.
    #[error("format error: {0}")]
    Format(String),

    /// A required input was absent entirely.
    #[error("missing input: {0}")]
    NilInput(String),

    /// Account name or key could not be resolved from the secret mapping.
    ///
    /// The message carries the key names present in the mapping, never the
    /// values.
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// Derived share name fails provider constraints after sanitization.
    #[error("invalid share name: {0}")]
    NameInvalid(String),

    /// A mount point exists but is stale or broken. Recoverable by remount.
    #[error("corrupted mount: {0}")]
    MountCorrupted(String),

    /// Loop device bind or unbind failure.
    #[error("loop attach failed: {0}")]
    AttachFailed(String),

    /// Filesystem creation on a loop device failed.
    #[error("mkfs failed: {0}")]
    FormatFailed(String),

    /// Wrapped failure from the storage control-plane client.
    #[error("provider error: {0}")]
    Provider(String),

    /// Host filesystem or syscall failure.
    #[error("storage error: {0}")]
    Storage(String),
}
