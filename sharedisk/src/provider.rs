//! Storage control-plane seam.
//!
//! The driver never talks to the provider's management API directly; it goes
//! through this trait. The real client (HTTP, retries, auth) lives with the
//! embedder. Tests use an in-memory fake.

use async_trait::async_trait;

use crate::errors::SharediskResult;

/// Cloud storage control-plane client.
///
/// All operations are idempotent on the provider side; the driver does not
/// retry them itself.
#[async_trait]
pub trait ShareProvider: Send + Sync {
    /// Create a share with the given quota in GiB. Creating a share that
    /// already exists succeeds.
    async fn create_share(
        &self,
        account_name: &str,
        share_name: &str,
        quota_gib: u64,
    ) -> SharediskResult<()>;

    /// Delete a share and everything in it.
    async fn delete_share(&self, account_name: &str, share_name: &str) -> SharediskResult<()>;

    /// Allocate a file of `size_bytes` inside a share (VHD backing files).
    async fn create_file(
        &self,
        account_name: &str,
        share_name: &str,
        file_name: &str,
        size_bytes: u64,
    ) -> SharediskResult<()>;

    /// Resize an existing file inside a share.
    async fn resize_file(
        &self,
        account_name: &str,
        share_name: &str,
        file_name: &str,
        size_bytes: u64,
    ) -> SharediskResult<()>;

    /// Delete a file inside a share.
    async fn delete_file(
        &self,
        account_name: &str,
        share_name: &str,
        file_name: &str,
    ) -> SharediskResult<()>;

    /// Data-plane URL for direct file operations.
    fn file_url(&self, account_name: &str, share_name: &str, file_name: &str) -> String;
}
