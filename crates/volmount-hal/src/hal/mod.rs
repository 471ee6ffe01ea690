//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for host operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod clock_ops;
pub mod fake_hal;
pub mod format_ops;
pub mod fs_ops;
pub mod linux_hal;
pub mod mount_ops;
pub mod process_ops;
pub mod resize_ops;

pub use clock_ops::ClockOps;
pub use fake_hal::{FakeHal, Operation};
pub use format_ops::{DiskFormat, FormatOps, FormatOptions, FsckOutcome};
pub use fs_ops::FsOps;
pub use linux_hal::LinuxHal;
pub use mount_ops::{MountOps, MountOptions};
pub use process_ops::ProcessOps;
pub use resize_ops::ResizeOps;

/// Complete HAL combining all host operation traits.
pub trait SystemHal:
    FsOps + ProcessOps + ClockOps + MountOps + FormatOps + ResizeOps + Send + Sync
{
}

/// Automatically implement SystemHal for any type implementing all required traits.
impl<T> SystemHal for T where
    T: FsOps + ProcessOps + ClockOps + MountOps + FormatOps + ResizeOps + Send + Sync
{
}
