//! In-memory host and provider fakes shared by the unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{SharediskError, SharediskResult};
use crate::mount::host::HostOps;
use crate::provider::ShareProvider;

/// Mutable host state behind [`MockHost`].
#[derive(Default)]
pub struct HostState {
    /// target -> mount source (device path or share URL)
    pub mounts: HashMap<PathBuf, String>,
    /// target -> options of the most recent mount there
    pub mount_options: HashMap<PathBuf, Vec<String>>,
    /// backing file -> loop device
    pub loops: HashMap<PathBuf, PathBuf>,
    /// device -> filesystem type
    pub formatted: HashMap<PathBuf, String>,
    /// ordered log of state-changing calls
    pub calls: Vec<String>,
    /// number of loop_attach invocations
    pub attach_count: u32,
    next_loop: u32,
}

/// Host fake tracking mounts, loop bindings and formats in memory.
pub struct MockHost {
    pub state: Mutex<HostState>,
    /// Artificial latency for mount calls, used by parallelism tests.
    pub mount_delay: Duration,
    /// When set, unmounts of this target fail.
    pub fail_unmount_of: Mutex<Option<PathBuf>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            mount_delay: Duration::ZERO,
            fail_unmount_of: Mutex::new(None),
        }
    }

    pub fn with_mount_delay(delay: Duration) -> Self {
        Self {
            mount_delay: delay,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

impl HostOps for MockHost {
    fn mount(
        &self,
        source: &str,
        target: &Path,
        _fstype: &str,
        options: &[String],
    ) -> SharediskResult<()> {
        if !self.mount_delay.is_zero() {
            std::thread::sleep(self.mount_delay);
        }
        let mut state = self.state.lock();
        state.calls.push(format!("mount {}", target.display()));
        state.mounts.insert(target.to_path_buf(), source.to_string());
        state
            .mount_options
            .insert(target.to_path_buf(), options.to_vec());
        Ok(())
    }

    fn bind_mount(&self, source: &Path, target: &Path) -> SharediskResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("bind {}", target.display()));
        state
            .mounts
            .insert(target.to_path_buf(), source.display().to_string());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> SharediskResult<()> {
        if self.fail_unmount_of.lock().as_deref() == Some(target) {
            return Err(SharediskError::Storage(format!(
                "unmount {} failed: device busy",
                target.display()
            )));
        }
        let mut state = self.state.lock();
        state.calls.push(format!("unmount {}", target.display()));
        if state.mounts.remove(target).is_none() {
            return Err(SharediskError::Storage(format!(
                "unmount {} failed: not mounted",
                target.display()
            )));
        }
        drop(state);
        // A corrupted mount point in tests is a dangling symlink; releasing
        // the mount makes the path a plain location again.
        if std::fs::symlink_metadata(target)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
        {
            let _ = std::fs::remove_file(target);
        }
        Ok(())
    }

    fn is_mount_point(&self, target: &Path) -> SharediskResult<bool> {
        Ok(self.state.lock().mounts.contains_key(target))
    }

    fn loop_attach(&self, file: &Path) -> SharediskResult<PathBuf> {
        let mut state = self.state.lock();
        state.attach_count += 1;
        let device = PathBuf::from(format!("/dev/loop{}", state.next_loop));
        state.next_loop += 1;
        state.calls.push(format!("loop_attach {}", file.display()));
        state.loops.insert(file.to_path_buf(), device.clone());
        Ok(device)
    }

    fn loop_lookup(&self, file: &Path) -> SharediskResult<Option<PathBuf>> {
        Ok(self.state.lock().loops.get(file).cloned())
    }

    fn loop_detach(&self, device: &Path) -> SharediskResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("loop_detach {}", device.display()));
        let file = state
            .loops
            .iter()
            .find(|(_, dev)| dev.as_path() == device)
            .map(|(file, _)| file.clone());
        match file {
            Some(file) => {
                state.loops.remove(&file);
                Ok(())
            }
            None => Err(SharediskError::AttachFailed(format!(
                "loop device {} not attached",
                device.display()
            ))),
        }
    }

    fn format(&self, device: &Path, fstype: &str) -> SharediskResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("format {}", device.display()));
        state.formatted.insert(device.to_path_buf(), fstype.to_string());
        Ok(())
    }

    fn filesystem_type(&self, device: &Path) -> SharediskResult<Option<String>> {
        Ok(self.state.lock().formatted.get(device).cloned())
    }
}

/// Mutable provider state behind [`MockProvider`].
#[derive(Default)]
pub struct ProviderState {
    /// (account, share) -> quota in GiB
    pub shares: HashMap<(String, String), u64>,
    /// (account, share, file) -> size in bytes
    pub files: HashMap<(String, String, String), u64>,
    pub fail_create_share: bool,
}

/// Control-plane fake recording shares and VHD files in memory.
#[derive(Default)]
pub struct MockProvider {
    pub state: Mutex<ProviderState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShareProvider for MockProvider {
    async fn create_share(
        &self,
        account_name: &str,
        share_name: &str,
        quota_gib: u64,
    ) -> SharediskResult<()> {
        let mut state = self.state.lock();
        if state.fail_create_share {
            return Err(SharediskError::Provider("share quota exhausted".into()));
        }
        state
            .shares
            .insert((account_name.to_string(), share_name.to_string()), quota_gib);
        Ok(())
    }

    async fn delete_share(&self, account_name: &str, share_name: &str) -> SharediskResult<()> {
        self.state
            .lock()
            .shares
            .remove(&(account_name.to_string(), share_name.to_string()));
        Ok(())
    }

    async fn create_file(
        &self,
        account_name: &str,
        share_name: &str,
        file_name: &str,
        size_bytes: u64,
    ) -> SharediskResult<()> {
        self.state.lock().files.insert(
            (
                account_name.to_string(),
                share_name.to_string(),
                file_name.to_string(),
            ),
            size_bytes,
        );
        Ok(())
    }

    async fn resize_file(
        &self,
        account_name: &str,
        share_name: &str,
        file_name: &str,
        size_bytes: u64,
    ) -> SharediskResult<()> {
        let mut state = self.state.lock();
        let key = (
            account_name.to_string(),
            share_name.to_string(),
            file_name.to_string(),
        );
        match state.files.get_mut(&key) {
            Some(size) => {
                *size = size_bytes;
                Ok(())
            }
            None => Err(SharediskError::Provider(format!(
                "file {} not found in share {}",
                file_name, share_name
            ))),
        }
    }

    async fn delete_file(
        &self,
        account_name: &str,
        share_name: &str,
        file_name: &str,
    ) -> SharediskResult<()> {
        self.state.lock().files.remove(&(
            account_name.to_string(),
            share_name.to_string(),
            file_name.to_string(),
        ));
        Ok(())
    }

    fn file_url(&self, account_name: &str, share_name: &str, file_name: &str) -> String {
        format!(
            "https://{}.file.storage.local/{}/{}",
            account_name, share_name, file_name
        )
    }
}
