//! sharedisk - file-share-backed volume driver.
//!
//! Exposes network file shares as mountable filesystems and, through a VHD
//! overlay, as loop-attached pseudo block devices, without a managed-disk
//! control plane. The embedding RPC layer drives the [`driver::Driver`]
//! lifecycle verbs; the storage control-plane client and host mount/loop
//! subsystem plug in behind the [`provider::ShareProvider`] and
//! [`mount::HostOps`] seams.

pub mod config;
pub mod constants;
pub mod credentials;
pub mod driver;
pub mod errors;
pub mod identity;
pub mod mount;
pub mod provider;
pub mod sharename;
pub mod telemetry;
pub mod volumes;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DriverConfig, MountDefaults};
pub use driver::{CreateVolumeRequest, Driver};
pub use errors::{SharediskError, SharediskResult};
pub use identity::VolumeId;
pub use provider::ShareProvider;

#[cfg(target_os = "linux")]
pub use mount::host::LinuxHost;
