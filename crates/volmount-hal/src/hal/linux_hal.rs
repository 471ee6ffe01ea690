//! Linux HAL implementation using real system calls.

use super::{
    ClockOps, DiskFormat, FormatOps, FormatOptions, FsOps, FsckOutcome, MountOps, MountOptions,
    ProcessOps, ResizeOps,
};
use crate::procfs::mountinfo::{self, MountInfo};
use crate::{CancelToken, HalError, HalResult, SleepOutcome};
use nix::mount::MsFlags;
use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const FORMAT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const FSCK_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const RESIZE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// blkid exits with 2 when no signature matched the requested tags.
const BLKID_NOTHING_FOUND: i32 = 2;

fn map_command_err(program: &str, err: io::Error) -> HalError {
    if err.kind() == io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_failed(program: &str, output: &Output) -> HalError {
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn output_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child.wait_timeout(timeout).map_err(HalError::Io)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn status_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<()> {
    let output = output_with_timeout(program, cmd, timeout)?;
    if !output.status.success() {
        return Err(output_failed(program, &output));
    }
    Ok(())
}

fn map_nix_err(err: nix::errno::Errno, path: &Path) -> HalError {
    use nix::errno::Errno;
    match err {
        Errno::EBUSY => HalError::Busy,
        Errno::EACCES | Errno::EPERM => HalError::PermissionDenied(path.display().to_string()),
        other => HalError::Nix(other),
    }
}

/// Split mount options into kernel flags and the filesystem-specific data string.
fn split_mount_options(options: &MountOptions) -> (MsFlags, Option<String>) {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();
    for opt in &options.options {
        match opt.as_str() {
            "ro" => flags |= MsFlags::MS_RDONLY,
            "rw" => {}
            "bind" => flags |= MsFlags::MS_BIND,
            "rbind" => flags |= MsFlags::MS_BIND | MsFlags::MS_REC,
            "noatime" => flags |= MsFlags::MS_NOATIME,
            "nodiratime" => flags |= MsFlags::MS_NODIRATIME,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "sync" => flags |= MsFlags::MS_SYNCHRONOUS,
            "defaults" => {}
            other => data.push(other),
        }
    }
    let data = if data.is_empty() {
        None
    } else {
        Some(data.join(","))
    };
    (flags, data)
}

/// Interpret `blkid -o export` output.
fn parse_blkid_export(stdout: &str) -> DiskFormat {
    let mut fstype = None;
    let mut pttype = None;
    for line in stdout.lines().map(str::trim) {
        if let Some(v) = line.strip_prefix("TYPE=") {
            fstype = Some(v.to_string());
        } else if let Some(v) = line.strip_prefix("PTTYPE=") {
            pttype = Some(v.to_string());
        }
    }
    match (fstype, pttype) {
        (Some(fs), _) if !fs.is_empty() => DiskFormat::Filesystem(fs),
        (_, Some(pt)) if !pt.is_empty() => DiskFormat::PartitionTable(pt),
        _ => DiskFormat::Unformatted,
    }
}

fn mkfs_args(fstype: &str, device: &Path, opts: &FormatOptions) -> Vec<String> {
    let mut args: Vec<String> = match fstype {
        // Force, and do not reserve blocks for root on a data volume.
        "ext2" | "ext3" | "ext4" => vec!["-F".to_string(), "-m0".to_string()],
        // Stale signatures blkid did not report would otherwise make mkfs.xfs refuse.
        "xfs" => vec!["-f".to_string()],
        _ => Vec::new(),
    };
    args.extend(opts.extra_args.iter().cloned());
    args.push(device.display().to_string());
    args
}

impl FsOps for LinuxHal {
    fn path_exists(&self, path: &Path) -> HalResult<bool> {
        match fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(HalError::Io(err)),
        }
    }

    fn read_dir_names(&self, dir: &Path) -> HalResult<Vec<String>> {
        let names = fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        Ok(names)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> HalResult<()> {
        fs::write(path, contents)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> HalResult<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(path)?;
        Ok(())
    }

    fn create_file(&self, path: &Path) -> HalResult<()> {
        fs::OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o644)
            .open(path)?;
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> HalResult<()> {
        fs::remove_dir(path)?;
        Ok(())
    }
}

impl ProcessOps for LinuxHal {
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        output_with_timeout(program, &mut cmd, timeout)
    }

    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        status_with_timeout(program, &mut cmd, timeout)
    }
}

impl ClockOps for LinuxHal {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> SleepOutcome {
        cancel.wait_timeout(duration)
    }
}

impl MountOps for LinuxHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()> {
        let (flags, data) = split_mount_options(options);
        log::debug!(
            "mount {} -> {} (type: {:?}, flags: {:?}, data: {:?})",
            device.display(),
            target.display(),
            fstype,
            flags,
            data
        );

        nix::mount::mount(Some(device), target, fstype, flags, data.as_deref())
            .map_err(|e| map_nix_err(e, target))?;

        Ok(())
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        nix::mount::umount2(target, nix::mount::MntFlags::empty())
            .map_err(|e| map_nix_err(e, target))?;

        Ok(())
    }

    fn mount_entries(&self) -> HalResult<Vec<MountInfo>> {
        let content = fs::read_to_string(MOUNTINFO_PATH)?;
        Ok(mountinfo::parse_mountinfo(&content))
    }
}

impl FormatOps for LinuxHal {
    fn probe_format(&self, device: &Path) -> HalResult<DiskFormat> {
        let dev = device.to_string_lossy().into_owned();
        let output = self.command_output(
            "blkid",
            &["-p", "-s", "TYPE", "-s", "PTTYPE", "-o", "export", dev.as_str()],
            PROBE_TIMEOUT,
        )?;

        if output.status.code() == Some(BLKID_NOTHING_FOUND) {
            return Ok(DiskFormat::Unformatted);
        }
        if !output.status.success() {
            return Err(output_failed("blkid", &output));
        }

        Ok(parse_blkid_export(&String::from_utf8_lossy(&output.stdout)))
    }

    fn make_fs(&self, device: &Path, fstype: &str, opts: &FormatOptions) -> HalResult<()> {
        let program = format!("mkfs.{}", fstype);
        let args = mkfs_args(fstype, device, opts);

        log::info!("Formatting {} with {}", device.display(), program);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.command_status(&program, &args, FORMAT_TIMEOUT)
    }

    fn check_fs(&self, device: &Path) -> HalResult<FsckOutcome> {
        let dev = device.to_string_lossy().into_owned();
        log::debug!("Checking filesystem on {}", device.display());
        let output = self.command_output("fsck", &["-a", dev.as_str()], FSCK_TIMEOUT)?;
        Ok(FsckOutcome::from_exit_code(output.status.code()))
    }
}

impl ResizeOps for LinuxHal {
    fn resize2fs(&self, device: &Path) -> HalResult<()> {
        let dev = device.to_string_lossy().into_owned();
        self.command_status("resize2fs", &[dev.as_str()], RESIZE_TIMEOUT)
    }

    fn xfs_growfs(&self, mount_path: &Path) -> HalResult<()> {
        let path = mount_path.to_string_lossy().into_owned();
        self.command_status("xfs_growfs", &["-d", path.as_str()], RESIZE_TIMEOUT)
    }
}
