//! Mount operations trait.

use crate::procfs::mountinfo::{self, MountInfo};
use crate::HalResult;
use std::path::Path;

/// Trait for mounting and unmounting filesystems.
pub trait MountOps {
    /// Mount a device to a target path.
    ///
    /// # Arguments
    /// * `device` - Device path (e.g., `/dev/disk/by-id/virtio-0123`)
    /// * `target` - Mount point path
    /// * `fstype` - Optional filesystem type (e.g., `"ext4"`, `"xfs"`)
    /// * `options` - Mount options
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()>;

    /// Unmount a filesystem.
    fn unmount(&self, target: &Path) -> HalResult<()>;

    /// Current mount table.
    fn mount_entries(&self) -> HalResult<Vec<MountInfo>>;

    /// Check if a path is currently a mount point.
    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        let entries = self.mount_entries()?;
        Ok(mountinfo::is_mounted_from_info(path, &entries))
    }
}

/// Mount options, passed through as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub options: Vec<String>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|o| o == "ro")
    }
}
