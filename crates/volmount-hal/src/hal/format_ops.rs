//! Filesystem probing and formatting operations trait.

use crate::HalResult;
use std::path::Path;

/// What a block device currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskFormat {
    /// No filesystem signature and no partition table.
    Unformatted,
    /// A filesystem of the given type (e.g. `"ext4"`).
    Filesystem(String),
    /// A partition table but no filesystem on the whole device.
    PartitionTable(String),
}

/// Result of a preen-mode (`fsck -a`) check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsckOutcome {
    Clean,
    /// Errors were found and repaired.
    Corrected,
    /// Errors remain; the filesystem must not be mounted.
    Uncorrected,
    /// fsck failed for another reason (exit code, if any).
    Failed(Option<i32>),
}

impl FsckOutcome {
    /// Map an fsck exit code (see fsck(8)).
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => FsckOutcome::Clean,
            Some(1) => FsckOutcome::Corrected,
            Some(4) => FsckOutcome::Uncorrected,
            other => FsckOutcome::Failed(other),
        }
    }
}

/// Trait for probing and formatting block devices.
pub trait FormatOps {
    /// Detect the existing format of a device.
    fn probe_format(&self, device: &Path) -> HalResult<DiskFormat>;

    /// Create a filesystem of type `fstype` on `device`.
    ///
    /// # Arguments
    /// * `device` - Block device path
    /// * `fstype` - Filesystem type; `mkfs.<fstype>` is invoked
    /// * `opts` - Extra formatting arguments
    fn make_fs(&self, device: &Path, fstype: &str, opts: &FormatOptions) -> HalResult<()>;

    /// Check and repair the filesystem on an unmounted `device`.
    fn check_fs(&self, device: &Path) -> HalResult<FsckOutcome>;
}

/// Options for formatting operations.
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// Additional arguments to pass to the format command
    pub extra_args: Vec<String>,
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}
