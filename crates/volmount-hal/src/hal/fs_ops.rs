//! Filesystem capability: stat, directory listing and small file writes.

use crate::HalResult;
use std::path::Path;

/// Filesystem operations trait.
pub trait FsOps {
    /// Whether `path` exists (following symlinks).
    ///
    /// A missing path is `Ok(false)`. Any other stat failure (permissions, I/O)
    /// is returned as an error so callers can tell "absent" from "broken".
    fn path_exists(&self, path: &Path) -> HalResult<bool>;

    /// Names of the entries in `dir`, unsorted.
    fn read_dir_names(&self, dir: &Path) -> HalResult<Vec<String>>;

    /// Write `contents` to `path`, creating it if needed.
    fn write_file(&self, path: &Path, contents: &[u8]) -> HalResult<()>;

    /// Create `path` and its parents (mode 0755). An existing directory is fine.
    fn create_dir_all(&self, path: &Path) -> HalResult<()>;

    /// Create an empty file at `path` (mode 0644). An existing file is fine.
    fn create_file(&self, path: &Path) -> HalResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &Path) -> HalResult<()>;
}
