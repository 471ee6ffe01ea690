//! Format, mount and clean up volumes on the node.

use crate::config::MounterConfig;
use std::path::Path;
use volmount_error::{MountError, MountResult};
use volmount_hal::procfs::mountinfo;
use volmount_hal::{DiskFormat, FormatOptions, FsckOutcome, LinuxHal, MountOptions, SystemHal};

/// Filesystems we know how to create on a blank device.
const FORMATTABLE: &[&str] = &["ext2", "ext3", "ext4", "xfs"];

fn is_ext_family(fstype: &str) -> bool {
    matches!(fstype, "ext2" | "ext3" | "ext4")
}

/// Node-side volume operations on top of a HAL.
#[derive(Debug, Clone)]
pub struct Mounter<H> {
    hal: H,
    config: MounterConfig,
}

impl Mounter<LinuxHal> {
    /// Mounter acting on the real host.
    pub fn linux(config: MounterConfig) -> MountResult<Self> {
        Self::with_config(LinuxHal::new(), config)
    }
}

impl<H: SystemHal> Mounter<H> {
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            config: MounterConfig::default(),
        }
    }

    /// Mounter with a custom config, rejected with [`MountError::Config`] if invalid.
    pub fn with_config(hal: H, config: MounterConfig) -> MountResult<Self> {
        config.validate()?;
        Ok(Self { hal, config })
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn config(&self) -> &MounterConfig {
        &self.config
    }

    /// Mount `source` on `target`, creating a filesystem first if the device is blank.
    ///
    /// An existing filesystem is never reformatted: if it differs from `fstype`
    /// the device is mounted with what it actually holds. An empty `fstype`
    /// means the configured default.
    pub fn format_and_mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: &str,
        options: &MountOptions,
    ) -> MountResult<()> {
        let fstype = if fstype.is_empty() {
            self.config.default_fstype.as_str()
        } else {
            fstype
        };

        let mount_fstype = match self.hal.probe_format(source)? {
            DiskFormat::Unformatted => {
                if options.is_read_only() {
                    return Err(MountError::UnformattedReadOnly(
                        source.display().to_string(),
                    ));
                }
                if !FORMATTABLE.contains(&fstype) {
                    return Err(MountError::UnsupportedFilesystem(fstype.to_string()));
                }
                log::info!(
                    "Disk {} appears to be unformatted, formatting as {}",
                    source.display(),
                    fstype
                );
                self.hal
                    .make_fs(source, fstype, &FormatOptions::new())?;
                fstype.to_string()
            }
            DiskFormat::Filesystem(existing) => {
                if !options.is_read_only() && is_ext_family(&existing) {
                    self.check_filesystem(source)?;
                }
                if existing != fstype {
                    log::warn!(
                        "Disk {} already holds {}, requested {}; mounting as {}",
                        source.display(),
                        existing,
                        fstype,
                        existing
                    );
                }
                existing
            }
            DiskFormat::PartitionTable(pttype) => {
                return Err(MountError::PartitionedDevice {
                    device: source.display().to_string(),
                    pttype,
                });
            }
        };

        log::info!(
            "Mounting {} at {} ({})",
            source.display(),
            target.display(),
            mount_fstype
        );
        self.hal
            .mount_device(source, target, Some(mount_fstype.as_str()), options)?;
        Ok(())
    }

    /// Run `fsck -a` before mounting an existing filesystem read-write.
    fn check_filesystem(&self, source: &Path) -> MountResult<()> {
        match self.hal.check_fs(source)? {
            FsckOutcome::Clean => {}
            FsckOutcome::Corrected => {
                log::info!("Device {} has errors which were corrected by fsck", source.display());
            }
            FsckOutcome::Uncorrected => {
                return Err(MountError::UncorrectableFilesystem(
                    source.display().to_string(),
                ));
            }
            FsckOutcome::Failed(code) => {
                log::warn!(
                    "fsck of {} failed (exit={:?}), mounting anyway",
                    source.display(),
                    code
                );
            }
        }
        Ok(())
    }

    /// Unmount `path` if it is a mount point, then remove the directory.
    ///
    /// A missing path is already clean. A mount point that cannot even be
    /// stat'ed (dead FUSE daemon, stale NFS handle) is unmounted regardless.
    /// With `extensive_check`, stacked mounts on the same path are unmounted
    /// until none remain.
    pub fn cleanup_mount_point(&self, path: &Path, extensive_check: bool) -> MountResult<()> {
        let corrupted = match self.hal.path_exists(path) {
            Ok(true) => false,
            Ok(false) => {
                log::debug!("{} does not exist, nothing to clean up", path.display());
                return Ok(());
            }
            Err(err) if err.is_corrupted_mount() => {
                log::warn!("Mount point {} is corrupted ({err}), unmounting", path.display());
                true
            }
            Err(err) => return Err(err.into()),
        };

        if corrupted || self.hal.is_mounted(path)? {
            log::info!("Unmounting {}", path.display());
            self.hal.unmount(path)?;
            if extensive_check {
                while self.hal.is_mounted(path)? {
                    log::info!("{} still mounted, unmounting again", path.display());
                    self.hal.unmount(path)?;
                }
            }
        } else {
            log::debug!("{} is not a mount point", path.display());
        }

        self.hal.remove_dir(path)?;
        log::info!("Removed mount point {}", path.display());
        Ok(())
    }

    /// Device mounted at `mount_path` and how many mount points reference it.
    ///
    /// Returns `("", 0)` when nothing is mounted there.
    pub fn get_device_name(&self, mount_path: &Path) -> MountResult<(String, usize)> {
        let entries = self.hal.mount_entries()?;
        let Some(entry) = mountinfo::find_mount(mount_path, &entries) else {
            return Ok((String::new(), 0));
        };
        let refs = mountinfo::mount_points_for_source(&entry.source, &entries).len();
        Ok((entry.source.clone(), refs))
    }

    pub fn exists_path(&self, path: &Path) -> MountResult<bool> {
        Ok(self.hal.path_exists(path)?)
    }

    pub fn make_dir(&self, path: &Path) -> MountResult<()> {
        Ok(self.hal.create_dir_all(path)?)
    }

    pub fn make_file(&self, path: &Path) -> MountResult<()> {
        Ok(self.hal.create_file(path)?)
    }

    /// Grow the filesystem on `device` (mounted at `mount_path`) to fill the device.
    pub fn resize(&self, device: &Path, mount_path: &Path) -> MountResult<()> {
        match self.hal.probe_format(device)? {
            DiskFormat::Filesystem(fs) if is_ext_family(&fs) => {
                log::info!("Resizing {} filesystem on {}", fs, device.display());
                self.hal.resize2fs(device)?;
            }
            DiskFormat::Filesystem(fs) if fs == "xfs" => {
                log::info!("Growing xfs filesystem at {}", mount_path.display());
                self.hal.xfs_growfs(mount_path)?;
            }
            DiskFormat::Filesystem(fs) => return Err(MountError::UnsupportedFilesystem(fs)),
            DiskFormat::Unformatted | DiskFormat::PartitionTable(_) => {
                return Err(MountError::UnsupportedFilesystem(format!(
                    "no filesystem on {}",
                    device.display()
                )));
            }
        }
        Ok(())
    }
}
