//! volmount core library.
//!
//! Resolves volume IDs to host block devices under `/dev/disk/by-id`, and
//! formats, mounts and cleans up those devices through the HAL.

pub mod backoff;
pub mod config;
pub mod device;
pub mod logging;
pub mod mounter;
pub mod rescan;
pub mod serial;

pub use backoff::Backoff;
pub use config::MounterConfig;
pub use device::{DISK_ID_PATH, SOURCE_PATH_PREFIXES};
pub use mounter::Mounter;
pub use rescan::{SCSI_HOST_PATH, SCSI_SCAN_PAYLOAD};
pub use serial::disk_uuid_to_serial;

pub use volmount_error::{HalError, MountError, MountResult};
pub use volmount_hal::{CancelToken, FakeHal, LinuxHal, MountOptions, SystemHal};
