//! Online filesystem growth.

use crate::HalResult;
use std::path::Path;

pub trait ResizeOps {
    /// Grow an ext2/3/4 filesystem on `device` to fill it.
    fn resize2fs(&self, device: &Path) -> HalResult<()>;

    /// Grow the XFS filesystem mounted at `mount_path`.
    fn xfs_growfs(&self, mount_path: &Path) -> HalResult<()>;
}
