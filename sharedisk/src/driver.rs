//! Volume lifecycle orchestrator.
//!
//! The RPC layer hands each lifecycle verb to [`Driver`], which sequences
//! identifier decode, credential resolution, share-name derivation, provider
//! calls and the VHD state machine. A failing component aborts the remaining
//! steps of that request; there is no cross-step compensation beyond the
//! teardown ordering the VHD manager already guarantees.
//!
//! Work is serialized per volume identifier. Requests for different volumes
//! run fully in parallel, which is what makes a burst of N attachments take
//! roughly as long as the slowest one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::DriverConfig;
use crate::constants::vhd as vhd_constants;
use crate::credentials;
use crate::errors::{SharediskError, SharediskResult};
use crate::identity::VolumeId;
use crate::mount::health::is_corrupted_dir;
use crate::mount::host::HostOps;
use crate::mount::options::append_default_mount_options;
use crate::provider::ShareProvider;
use crate::sharename::{begins_and_ends_valid, derive_share_name, generated_share_name};
use crate::volumes::lock::LockRegistry;
use crate::volumes::vhd::{VhdManager, unmount_if_mounted};

const GIB: u64 = 1 << 30;

/// Parameters for provisioning a new volume.
#[derive(Debug, Clone)]
pub struct CreateVolumeRequest {
    /// Caller-supplied volume name, sanitized into the share name.
    pub volume_name: String,
    /// Resource group owning the storage account.
    pub resource_group: String,
    /// Storage account to create the share in.
    pub account_name: String,
    /// Requested capacity; share quota is this rounded up to whole GiB.
    pub capacity_bytes: u64,
    /// Provision a VHD backing file and hand the volume out as a block
    /// device instead of a plain share mount.
    pub block_mode: bool,
    /// Pin the share name instead of deriving it from the volume name.
    /// Validated against provider constraints, never sanitized.
    pub share_name: Option<String>,
}

/// The driver core invoked by the external RPC layer.
pub struct Driver {
    config: DriverConfig,
    provider: Arc<dyn ShareProvider>,
    host: Arc<dyn HostOps>,
    vhd: VhdManager,
    volume_locks: LockRegistry,
}

impl Driver {
    pub fn new(
        config: DriverConfig,
        provider: Arc<dyn ShareProvider>,
        host: Arc<dyn HostOps>,
    ) -> Self {
        Self {
            config,
            provider,
            vhd: VhdManager::new(Arc::clone(&host)),
            host,
            volume_locks: LockRegistry::new(),
        }
    }

    /// Provision a share (and, in block mode, its VHD backing file) and
    /// return the opaque identifier for all subsequent operations.
    pub async fn create_volume(&self, request: CreateVolumeRequest) -> SharediskResult<VolumeId> {
        let share_name = match &request.share_name {
            Some(pinned) => {
                validate_share_name(pinned)?;
                pinned.clone()
            }
            None => {
                let mut derived = derive_share_name(&request.volume_name);
                if !begins_and_ends_valid(&derived) {
                    tracing::warn!(
                        candidate = %derived,
                        "sanitized share name fails begin/end constraint, generating one"
                    );
                    derived = generated_share_name();
                }
                derived
            }
        };

        let quota_gib = request.capacity_bytes.div_ceil(GIB).max(1);
        self.provider
            .create_share(&request.account_name, &share_name, quota_gib)
            .await?;
        tracing::info!(
            account = %request.account_name,
            share = %share_name,
            quota_gib,
            "created share"
        );

        let disk_name = if request.block_mode {
            let disk_name = format!("{}.{}", share_name, vhd_constants::FILE_EXTENSION);
            self.provider
                .create_file(
                    &request.account_name,
                    &share_name,
                    &disk_name,
                    request.capacity_bytes,
                )
                .await?;
            tracing::info!(
                share = %share_name,
                disk = %disk_name,
                "created VHD backing file"
            );
            disk_name
        } else {
            String::new()
        };

        Ok(VolumeId {
            resource_group: request.resource_group,
            account_name: request.account_name,
            share_name,
            disk_name,
            snapshot: None,
        })
    }

    /// Delete the share behind a volume, and its VHD backing file first when
    /// one exists.
    pub async fn delete_volume(&self, volume_id: &str) -> SharediskResult<()> {
        let volume = VolumeId::decode(volume_id)?;
        let lock = self.volume_locks.get(volume_id);
        let _serialized = lock.lock().await;

        if volume.is_block_mode() {
            self.provider
                .delete_file(&volume.account_name, &volume.share_name, &volume.disk_name)
                .await?;
        }
        self.provider
            .delete_share(&volume.account_name, &volume.share_name)
            .await?;
        tracing::info!(volume_id, "deleted volume");
        Ok(())
    }

    /// Grow a block-mode volume's backing file.
    ///
    /// Filesystem-mode share quotas are managed by the control plane, not
    /// the node driver.
    pub async fn expand_volume(&self, volume_id: &str, capacity_bytes: u64) -> SharediskResult<()> {
        let volume = VolumeId::decode(volume_id)?;
        if !volume.is_block_mode() {
            return Err(SharediskError::Provider(format!(
                "volume {:?} is not block-mode; share quota changes go through the control plane",
                volume_id
            )));
        }
        let lock = self.volume_locks.get(volume_id);
        let _serialized = lock.lock().await;
        self.provider
            .resize_file(
                &volume.account_name,
                &volume.share_name,
                &volume.disk_name,
                capacity_bytes,
            )
            .await
    }

    /// Mount the volume's share at its private staging path.
    pub async fn stage_volume(
        &self,
        volume_id: &str,
        staging_path: &Path,
        secrets: Option<&HashMap<String, String>>,
        mount_options: &[String],
    ) -> SharediskResult<()> {
        let volume = VolumeId::decode(volume_id)?;
        let (account_name, account_key) = credentials::resolve(secrets)?;
        let lock = self.volume_locks.get(volume_id);
        let _serialized = lock.lock().await;

        let mut options =
            append_default_mount_options(mount_options, &self.config.mount_defaults);
        options.push(format!("username={}", account_name));
        options.push(format!("password={}", account_key));

        let source = self
            .config
            .share_source(&volume.account_name, &volume.share_name);
        self.vhd
            .stage_share(&source, staging_path, &self.config.share_fs_type, &options)
            .await
    }

    /// Expose the staged volume at its publish path: a bind mount of the
    /// share for filesystem-mode volumes, a formatted loop device for
    /// block-mode ones.
    pub async fn publish_volume(
        &self,
        volume_id: &str,
        staging_path: &Path,
        publish_path: &Path,
        fs_type: Option<&str>,
        capacity_bytes: u64,
    ) -> SharediskResult<()> {
        let volume = VolumeId::decode(volume_id)?;
        let lock = self.volume_locks.get(volume_id);
        let _serialized = lock.lock().await;

        if volume.is_block_mode() {
            let backing_file = staging_path.join(&volume.disk_name);
            let device = self.vhd.attach_loop(&backing_file, capacity_bytes).await?;
            let fstype = fs_type.unwrap_or(&self.config.block_fs_type).to_string();
            return self.vhd.format_and_mount(&device, publish_path, &fstype).await;
        }

        self.bind_publish(staging_path, publish_path).await
    }

    /// Remove the publish-path mount. Absent mounts count as done.
    pub async fn unpublish_volume(
        &self,
        volume_id: &str,
        publish_path: &Path,
    ) -> SharediskResult<()> {
        VolumeId::decode(volume_id)?;
        let lock = self.volume_locks.get(volume_id);
        let _serialized = lock.lock().await;

        let target = publish_path.to_path_buf();
        self.run_blocking(move |host| unmount_if_mounted(host.as_ref(), &target))
            .await
    }

    /// Tear the volume down to unstaged: publish unmount, loop detach,
    /// staging unmount, in that order. The VHD backing file survives; only
    /// [`Driver::delete_volume`] destroys data.
    pub async fn unstage_volume(
        &self,
        volume_id: &str,
        staging_path: &Path,
        publish_path: Option<&Path>,
    ) -> SharediskResult<()> {
        let volume = VolumeId::decode(volume_id)?;
        let lock = self.volume_locks.get(volume_id);
        let _serialized = lock.lock().await;

        if volume.is_block_mode() {
            let backing_file = staging_path.join(&volume.disk_name);
            return self.vhd.unstage(&backing_file, publish_path, staging_path).await;
        }

        if let Some(publish) = publish_path {
            let target = publish.to_path_buf();
            self.run_blocking(move |host| unmount_if_mounted(host.as_ref(), &target))
                .await?;
        }
        let target = staging_path.to_path_buf();
        self.run_blocking(move |host| unmount_if_mounted(host.as_ref(), &target))
            .await
    }

    /// Bind-mount the staged share at the publish path, recovering a
    /// corrupted publish point with one remount.
    async fn bind_publish(
        &self,
        staging_path: &Path,
        publish_path: &Path,
    ) -> SharediskResult<()> {
        if is_corrupted_dir(publish_path) {
            tracing::warn!(
                path = %publish_path.display(),
                "publish path corrupted, unmounting before rebind"
            );
            let target = publish_path.to_path_buf();
            self.run_blocking(move |host| host.unmount(&target))
                .await
                .map_err(|e| {
                    SharediskError::MountCorrupted(format!(
                        "publish path {} is corrupted and could not be released: {}",
                        publish_path.display(),
                        e
                    ))
                })?;
        }

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

        let source = staging_path.to_path_buf();
        let target = publish_path.to_path_buf();
        self.run_blocking(move |host| host.bind_mount(&source, &target))
            .await
    }

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
}

/// Validate a caller-pinned share name against provider constraints.
fn validate_share_name(name: &str) -> SharediskResult<()> {
    let legal_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !legal_chars
        || name.contains("--")
        || name.len() < crate::constants::share::NAME_MIN_LEN
        || name.len() > crate::constants::share::NAME_MAX_LEN
        || !begins_and_ends_valid(name)
    {
        return Err(SharediskError::NameInvalid(format!(
            "share name {:?} violates provider constraints \
             (lowercase alphanumerics and single hyphens, 3-63 chars, \
             alphanumeric at both ends)",
            name
        )));
    }
    Ok(())
}
