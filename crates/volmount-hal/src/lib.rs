//! volmount Host Abstraction Layer (HAL).
//!
//! Everything that touches the host (filesystem, processes, mounts, sleeping)
//! goes through the traits defined here so that device discovery and the mount
//! layer can be exercised against [`FakeHal`] without root or real devices.

pub mod cancel;
pub mod hal;
pub mod procfs;

pub use cancel::{CancelToken, SleepOutcome};
pub use hal::*;
pub use procfs::mountinfo::MountInfo;
pub use volmount_error::{HalError, HalResult};
