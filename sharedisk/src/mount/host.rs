//! Host mount and loop-device primitives.
//!
//! Everything here blocks: mount(2), losetup and mkfs all talk to the kernel
//! or fork a tool. Callers run these off the async path via
//! `tokio::task::spawn_blocking`. The [`HostOps`] trait is the seam the
//! volume manager is tested against; [`LinuxHost`] is the real thing.

use std::path::{Path, PathBuf};

use crate::errors::SharediskResult;

/// Blocking host mount/loop subsystem.
pub trait HostOps: Send + Sync {
    /// Mount `source` at `target` with the given filesystem type and
    /// comma-joined option data.
    fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        options: &[String],
    ) -> SharediskResult<()>;

    /// Bind-mount an already-mounted directory at a second location.
    fn bind_mount(&self, source: &Path, target: &Path) -> SharediskResult<()>;

    /// Unmount `target`. Fails if the path is mounted but cannot be released;
    /// callers treat a path that is not mounted at all as already done.
    fn unmount(&self, target: &Path) -> SharediskResult<()>;

    /// True when `target` is the root of a mount.
    fn is_mount_point(&self, target: &Path) -> SharediskResult<bool>;

    /// Bind `file` to a free loop device and return the device path.
    fn loop_attach(&self, file: &Path) -> SharediskResult<PathBuf>;

    /// Loop device currently backed by `file`, if any.
    fn loop_lookup(&self, file: &Path) -> SharediskResult<Option<PathBuf>>;

    /// Detach a loop device.
    fn loop_detach(&self, device: &Path) -> SharediskResult<()>;

    /// Create a filesystem of `fstype` on `device`.
    fn format(&self, device: &Path, fstype: &str) -> SharediskResult<()>;

    /// Filesystem signature on `device`, or `None` when the device is blank.
    fn filesystem_type(&self, device: &Path) -> SharediskResult<Option<String>>;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxHost;

#[cfg(target_os = "linux")]
mod linux {
    use std::os::unix::fs::MetadataExt;
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use nix::mount::{MntFlags, MsFlags, mount, umount2};

    use super::HostOps;
    use crate::errors::{SharediskError, SharediskResult};

    /// Real mount/loop implementation backed by mount(2), losetup, blkid and
    /// mkfs.
    pub struct LinuxHost;

    impl LinuxHost {
        pub fn new() -> Self {
            Self
        }

        fn run(command: &mut Command) -> SharediskResult<std::process::Output> {
            let program = command.get_program().to_string_lossy().into_owned();
            command.output().map_err(|e| {
                SharediskError::Storage(format!("failed to run {}: {}", program, e))
            })
        }
    }

    impl Default for LinuxHost {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HostOps for LinuxHost {
        fn mount(
            &self,
            source: &str,
            target: &Path,
            fstype: &str,
            options: &[String],
        ) -> SharediskResult<()> {
            let data = options.join(",");
            tracing::debug!(source, target = %target.display(), fstype, "mounting");
            mount(
                Some(source),
                target,
                Some(fstype),
                MsFlags::empty(),
                Some(data.as_str()),
            )
            .map_err(|e| {
                SharediskError::Storage(format!(
                    "mount {} at {} failed: {}",
                    source,
                    target.display(),
                    e
                ))
            })
        }

        fn bind_mount(&self, source: &Path, target: &Path) -> SharediskResult<()> {
            tracing::debug!(source = %source.display(), target = %target.display(), "bind mounting");
            mount(
                Some(source),
                target,
                None::<&str>,
                MsFlags::MS_BIND,
                None::<&str>,
            )
            .map_err(|e| {
                SharediskError::Storage(format!(
                    "bind mount {} at {} failed: {}",
                    source.display(),
                    target.display(),
                    e
                ))
            })
        }

        fn unmount(&self, target: &Path) -> SharediskResult<()> {
            tracing::debug!(target = %target.display(), "unmounting");
            umount2(target, MntFlags::empty()).map_err(|e| {
                SharediskError::Storage(format!("unmount {} failed: {}", target.display(), e))
            })
        }

        fn is_mount_point(&self, target: &Path) -> SharediskResult<bool> {
            let meta = match std::fs::metadata(target) {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
                Err(e) => {
                    return Err(SharediskError::Storage(format!(
                        "stat {} failed: {}",
                        target.display(),
                        e
                    )));
                }
            };
            let parent = match target.parent() {
                Some(p) => p,
                None => return Ok(true), // filesystem root
            };
            let parent_meta = std::fs::metadata(parent).map_err(|e| {
                SharediskError::Storage(format!("stat {} failed: {}", parent.display(), e))
            })?;
            // A mount root lives on a different device than its parent.
            Ok(meta.dev() != parent_meta.dev())
        }

        fn loop_attach(&self, file: &Path) -> SharediskResult<PathBuf> {
            let output = Self::run(Command::new("losetup").arg("--find").arg("--show").arg(file))?;
            if !output.status.success() {
                return Err(SharediskError::AttachFailed(format!(
                    "losetup --find --show {} failed: {}",
                    file.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            let device = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if device.is_empty() {
                return Err(SharediskError::AttachFailed(format!(
                    "losetup returned no device for {}",
                    file.display()
                )));
            }
            Ok(PathBuf::from(device))
        }

        fn loop_lookup(&self, file: &Path) -> SharediskResult<Option<PathBuf>> {
            let output = Self::run(
                Command::new("losetup")
                    .arg("--associated")
                    .arg(file)
                    .args(["--output", "NAME", "--noheadings"]),
            )?;
            if !output.status.success() {
                return Err(SharediskError::AttachFailed(format!(
                    "losetup --associated {} failed: {}",
                    file.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            let device = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            Ok((!device.is_empty()).then(|| PathBuf::from(device)))
        }

        fn loop_detach(&self, device: &Path) -> SharediskResult<()> {
            if !device.exists() {
                // Device node already gone, nothing to unbind.
                return Ok(());
            }
            let output = Self::run(Command::new("losetup").arg("-d").arg(device))?;
            if !output.status.success() {
                return Err(SharediskError::AttachFailed(format!(
                    "losetup -d {} failed: {}",
                    device.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(())
        }

        fn format(&self, device: &Path, fstype: &str) -> SharediskResult<()> {
            let mut command = Command::new(format!("mkfs.{}", fstype));
            match fstype {
                "ext4" | "ext3" | "ext2" => {
                    command.args(["-F", "-m0"]);
                }
                "xfs" => {
                    command.arg("-f");
                }
                other => {
                    return Err(SharediskError::FormatFailed(format!(
                        "unsupported filesystem type {:?}",
                        other
                    )));
                }
            }
            tracing::info!(device = %device.display(), fstype, "formatting loop device");
            let output = Self::run(command.arg(device))?;
            if !output.status.success() {
                return Err(SharediskError::FormatFailed(format!(
                    "mkfs.{} {} failed: {}",
                    fstype,
                    device.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(())
        }

        fn filesystem_type(&self, device: &Path) -> SharediskResult<Option<String>> {
            let output = Self::run(
                Command::new("blkid")
                    .args(["-p", "-s", "TYPE", "-o", "value"])
                    .arg(device),
            )?;
            // blkid exits 2 when no signature is recognized.
            if !output.status.success() {
                return Ok(None);
            }
            let fstype = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok((!fstype.is_empty()).then_some(fstype))
        }
    }
}
