use std::io;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;
pub type MountResult<T> = Result<T, MountError>;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Device or mount point is busy")]
    Busy,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("nix errno: {0}")]
    Nix(#[from] nix::errno::Errno),
}

impl HalError {
    /// Whether this error means the path simply is not there.
    pub fn is_not_found(&self) -> bool {
        match self {
            HalError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            HalError::Nix(errno) => *errno == nix::errno::Errno::ENOENT,
            _ => false,
        }
    }

    /// Whether this error, seen when touching a mount point, means the mount
    /// itself is broken (dead FUSE daemon, stale NFS handle, I/O error) rather
    /// than the path being absent or fine.
    pub fn is_corrupted_mount(&self) -> bool {
        let errno = match self {
            HalError::Io(err) => err.raw_os_error().map(nix::errno::Errno::from_raw),
            HalError::Nix(errno) => Some(*errno),
            _ => None,
        };
        matches!(
            errno,
            Some(
                nix::errno::Errno::ENOTCONN
                    | nix::errno::Errno::ESTALE
                    | nix::errno::Errno::EIO
                    | nix::errno::Errno::EACCES
                    | nix::errno::Errno::EHOSTDOWN
            )
        )
    }
}

#[derive(Error, Debug)]
pub enum MountError {
    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("failed to find device for the volumeID: {volume_id:?} within the alloted time")]
    DeviceNotFound { volume_id: String },

    #[error("device path was empty for volumeID: {volume_id:?}")]
    EmptyDevicePath { volume_id: String },

    #[error("{0} is not a mount point")]
    NotMounted(String),

    #[error("Unsupported filesystem type: {0}")]
    UnsupportedFilesystem(String),

    #[error("cannot mount unformatted device {0} read-only")]
    UnformattedReadOnly(String),

    #[error("{device} contains a partition table ({pttype}), refusing to format it")]
    PartitionedDevice { device: String, pttype: String },

    #[error("fsck found errors on device {0} but could not correct them")]
    UncorrectableFilesystem(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MountError {
    /// Device discovery timeouts may succeed later, once the attachment settles.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MountError::DeviceNotFound { .. })
    }
}

impl From<io::Error> for MountError {
    fn from(err: io::Error) -> Self {
        MountError::Hal(HalError::Io(err))
    }
}
