//! Driver configuration.
//!
//! All tunables live in an explicitly constructed, immutable [`DriverConfig`]
//! passed to the driver at construction time. There is no global mutable
//! state; embedders that need different defaults build a different config.

use serde::{Deserialize, Serialize};

use crate::constants::{mount, vhd};

/// Mount option defaults filled in by the option builder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MountDefaults {
    /// Directory permission mode appended when the caller did not set one.
    #[serde(default = "default_dir_mode")]
    pub dir_mode: String,

    /// File permission mode appended when the caller did not set one.
    #[serde(default = "default_file_mode")]
    pub file_mode: String,

    /// Share protocol version appended when the caller did not set one.
    #[serde(default = "default_vers")]
    pub vers: String,
}

impl Default for MountDefaults {
    fn default() -> Self {
        Self {
            dir_mode: default_dir_mode(),
            file_mode: default_file_mode(),
            vers: default_vers(),
        }
    }
}

/// Immutable driver-wide configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Host suffix used to build share mount sources:
    /// `//<account>.<suffix>/<share>`.
    #[serde(default = "default_share_host_suffix")]
    pub share_host_suffix: String,

    /// Filesystem type passed to the mount syscall for network shares.
    #[serde(default = "default_share_fs_type")]
    pub share_fs_type: String,

    /// Filesystem type used when formatting a fresh loop device and the
    /// request did not name one.
    #[serde(default = "default_block_fs_type")]
    pub block_fs_type: String,

    /// Defaults filled into every mount option set.
    #[serde(default)]
    pub mount_defaults: MountDefaults,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            share_host_suffix: default_share_host_suffix(),
            share_fs_type: default_share_fs_type(),
            block_fs_type: default_block_fs_type(),
            mount_defaults: MountDefaults::default(),
        }
    }
}

impl DriverConfig {
    /// Mount source for a share: `//<account>.<suffix>/<share>`.
    pub fn share_source(&self, account_name: &str, share_name: &str) -> String {
        format!(
            "//{}.{}/{}",
            account_name, self.share_host_suffix, share_name
        )
    }
}

fn default_dir_mode() -> String {
    mount::DEFAULT_DIR_MODE.to_string()
}

fn default_file_mode() -> String {
    mount::DEFAULT_FILE_MODE.to_string()
}

fn default_vers() -> String {
    mount::DEFAULT_VERS.to_string()
}

fn default_share_host_suffix() -> String {
    "file.storage.local".to_string()
}

fn default_share_fs_type() -> String {
    mount::SHARE_FS_TYPE.to_string()
}

fn default_block_fs_type() -> String {
    vhd::DEFAULT_FS_TYPE.to_string()
}
