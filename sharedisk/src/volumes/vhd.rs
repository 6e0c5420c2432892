//! VHD block volume state machine.
//!
//! A block-mode volume is a sparse disk image living inside a mounted
//! network share, loop-attached on the node to present as a block device:
//!
//! `Unstaged -> Staged (share mounted) -> Attached (loop bound)
//!  -> FilesystemReady (formatted, mounted) -> Detached -> Unstaged`
//!
//! Every step is idempotent so a retried request converges instead of
//! failing. Work is serialized per backing file; the node-global loop-table
//! lock is held only for the bind/unbind step, never across a slow format.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{SharediskError, SharediskResult};
use crate::mount::health::is_corrupted_dir;
use crate::mount::host::HostOps;

use super::lock::LockRegistry;

/// Sparse VHD backing file.
///
/// Deleted on drop unless persistent. Volume backing files are persistent:
/// they outlive unstage and are removed only by volume deletion through the
/// provider.
pub struct VhdFile {
    path: PathBuf,
    persistent: bool,
}

impl VhdFile {
    /// Open the backing file at `path`, sparse-allocating it with the
    /// requested size if absent. An existing file is reused untouched.
    pub fn ensure_sparse(
        path: &Path,
        size_bytes: u64,
        persistent: bool,
    ) -> SharediskResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SharediskError::Storage(format!(
                    "failed to create parent directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        if path.exists() {
            tracing::debug!(path = %path.display(), "backing file already exists");
            return Ok(Self {
                path: path.to_path_buf(),
                persistent,
            });
        }

        tracing::info!(
            path = %path.display(),
            size_bytes,
            "allocating sparse VHD backing file"
        );
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                SharediskError::Storage(format!(
                    "failed to create backing file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        file.set_len(size_bytes).map_err(|e| {
            SharediskError::Storage(format!(
                "failed to size backing file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            persistent,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for VhdFile {
    fn drop(&mut self) {
        if self.persistent {
            return;
        }
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("failed to clean up backing file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Orchestrates stage/attach/format/unstage for loop-backed volumes.
pub struct VhdManager {
    host: Arc<dyn HostOps>,
    file_locks: LockRegistry,
    // The loop-device table is global per node.
    loop_table: tokio::sync::Mutex<()>,
}

impl VhdManager {
    pub fn new(host: Arc<dyn HostOps>) -> Self {
        Self {
            host,
            file_locks: LockRegistry::new(),
            loop_table: tokio::sync::Mutex::new(()),
        }
    }

    /// Run a blocking host operation off the async path.
    async fn run_blocking<T, F>(&self, op: F) -> SharediskResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn HostOps>) -> SharediskResult<T> + Send + 'static,
    {
        let host = Arc::clone(&self.host);
        tokio::task::spawn_blocking(move || op(host))
            .await
            .map_err(|e| SharediskError::Storage(format!("blocking host task failed: {}", e)))?
    }

    /// Mount the backing network share at its private staging path.
    ///
    /// Idempotent: an already-healthy mount is reused. A corrupted mount
    /// point is unmounted and the mount retried once; failure after that
    /// surfaces to the caller.
    pub async fn stage_share(
        &self,
        source: &str,
        staging_path: &Path,
        fstype: &str,
        options: &[String],
    ) -> SharediskResult<()> {
        let staging = staging_path.to_path_buf();

        if is_corrupted_dir(&staging) {
            tracing::warn!(
                path = %staging.display(),
                "staging path corrupted, unmounting before remount"
            );
            let target = staging.clone();
            self.run_blocking(move |host| host.unmount(&target))
                .await
                .map_err(|e| {
                    SharediskError::MountCorrupted(format!(
                        "staging path {} is corrupted and could not be released: {}",
                        staging.display(),
                        e
                    ))
                })?;
        }

        std::fs::create_dir_all(&staging).map_err(|e| {
            SharediskError::Storage(format!(
                "failed to create staging path {}: {}",
                staging.display(),
                e
            ))
        })?;

        let target = staging.clone();
        if self
            .run_blocking(move |host| host.is_mount_point(&target))
            .await?
        {
            tracing::debug!(path = %staging.display(), "share already staged");
            return Ok(());
        }

        let mount_source = source.to_string();
        let mount_fstype = fstype.to_string();
        let mount_options = options.to_vec();
        self.run_blocking(move |host| {
            host.mount(&mount_source, &staging, &mount_fstype, &mount_options)
        })
        .await?;
        tracing::info!(source, path = %staging_path.display(), "staged share");
        Ok(())
    }

    /// Bind the backing file to a loop device, creating the file first when
    /// absent.
    ///
    /// Serialized per backing file, so two concurrent stagings of the same
    /// volume can never bind the file to two devices; the second caller
    /// observes the existing binding and returns it.
    pub async fn attach_loop(
        &self,
        backing_file: &Path,
        size_bytes: u64,
    ) -> SharediskResult<PathBuf> {
        let file_lock = self.file_locks.get(&backing_file.to_string_lossy());
        let _serialized = file_lock.lock().await;

        let file = backing_file.to_path_buf();
        let allocate = file.clone();
        self.run_blocking(move |_| {
            VhdFile::ensure_sparse(&allocate, size_bytes, true).map(|_| ())
        })
        .await?;

        let lookup = file.clone();
        if let Some(device) = self
            .run_blocking(move |host| host.loop_lookup(&lookup))
            .await?
        {
            tracing::debug!(
                file = %backing_file.display(),
                device = %device.display(),
                "backing file already loop-attached"
            );
            return Ok(device);
        }

        // Bind step only: a slow format on another volume must not wait here.
        let _table = self.loop_table.lock().await;
        let device = self
            .run_blocking(move |host| host.loop_attach(&file))
            .await?;
        tracing::info!(
            file = %backing_file.display(),
            device = %device.display(),
            "attached loop device"
        );
        Ok(device)
    }

    /// Format the loop device when it carries no filesystem signature, then
    /// mount it at the publish path. Republishing an already-formatted and
    /// mounted device is a no-op.
    pub async fn format_and_mount(
        &self,
        device: &Path,
        publish_path: &Path,
        fstype: &str,
    ) -> SharediskResult<()> {
        std::fs::create_dir_all(publish_path).map_err(|e| {
            SharediskError::Storage(format!(
                "failed to create publish path {}: {}",
                publish_path.display(),
                e
            ))
        })?;

        let target = publish_path.to_path_buf();
        if self
            .run_blocking(move |host| host.is_mount_point(&target))
            .await?
        {
            tracing::debug!(path = %publish_path.display(), "volume already published");
            return Ok(());
        }

        let probe = device.to_path_buf();
        let existing = self
            .run_blocking(move |host| host.filesystem_type(&probe))
            .await?;
        let mount_fstype = match existing {
            Some(signature) => {
                tracing::debug!(
                    device = %device.display(),
                    fstype = %signature,
                    "existing filesystem signature, skipping format"
                );
                signature
            }
            None => {
                let format_device = device.to_path_buf();
                let format_fstype = fstype.to_string();
                self.run_blocking(move |host| host.format(&format_device, &format_fstype))
                    .await?;
                fstype.to_string()
            }
        };

        let mount_device = device.display().to_string();
        let mount_target = publish_path.to_path_buf();
        self.run_blocking(move |host| host.mount(&mount_device, &mount_target, &mount_fstype, &[]))
            .await?;
        tracing::info!(
            device = %device.display(),
            path = %publish_path.display(),
            "published block volume"
        );
        Ok(())
    }

    /// Tear down in strict order: publish unmount, loop detach, staging
    /// unmount.
    ///
    /// "Already absent" at any step is success. A genuine failure surfaces
    /// immediately, leaving the volume in its last reached state for a
    /// future retry. The backing file itself is never touched here.
    pub async fn unstage(
        &self,
        backing_file: &Path,
        publish_path: Option<&Path>,
        staging_path: &Path,
    ) -> SharediskResult<()> {
        let file_lock = self.file_locks.get(&backing_file.to_string_lossy());
        let _serialized = file_lock.lock().await;

        if let Some(publish) = publish_path {
            let target = publish.to_path_buf();
            self.run_blocking(move |host| unmount_if_mounted(host.as_ref(), &target))
                .await?;
        }

        let lookup = backing_file.to_path_buf();
        if let Some(device) = self
            .run_blocking(move |host| host.loop_lookup(&lookup))
            .await?
        {
            let _table = self.loop_table.lock().await;
            let detach = device.clone();
            self.run_blocking(move |host| host.loop_detach(&detach))
                .await?;
            tracing::info!(device = %device.display(), "detached loop device");
        }

        let target = staging_path.to_path_buf();
        self.run_blocking(move |host| unmount_if_mounted(host.as_ref(), &target))
            .await
    }
}

/// Unmount `path` when it is actually mounted; a bare directory or an absent
/// path counts as already done. A corrupted mount is unmounted regardless,
/// since the stat-based mount check cannot see through it.
pub(crate) fn unmount_if_mounted(host: &dyn HostOps, path: &Path) -> SharediskResult<()> {
    if is_corrupted_dir(path) {
        return host.unmount(path);
    }
    if host.is_mount_point(path)? {
        host.unmount(path)
    } else {
        tracing::debug!(path = %path.display(), "not mounted, nothing to unmount");
        Ok(())
    }
}
