//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without root privileges or real hardware.
//! Paths can be scripted to appear after a number of sleeps, which is how
//! tests model a device surfacing after a bus rescan. Sleeps return at once
//! unless [`FakeHal::with_real_clock`] is used, in which case they block on
//! the cancel token like the real clock does.

use super::{
    ClockOps, DiskFormat, FormatOps, FormatOptions, FsOps, FsckOutcome, MountOps, MountOptions,
    ProcessOps, ResizeOps,
};
use crate::procfs::mountinfo::MountInfo;
use crate::{CancelToken, HalError, HalResult, SleepOutcome};
use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Stat {
        path: PathBuf,
    },
    ReadDir {
        dir: PathBuf,
    },
    WriteFile {
        path: PathBuf,
        contents: Vec<u8>,
    },
    CreateDir {
        path: PathBuf,
    },
    CreateFile {
        path: PathBuf,
    },
    RemoveDir {
        path: PathBuf,
    },
    Command {
        program: String,
        args: Vec<String>,
        timeout_secs: u64,
    },
    Sleep {
        duration: Duration,
    },
    Mount {
        device: PathBuf,
        target: PathBuf,
        fstype: Option<String>,
        options: Vec<String>,
    },
    Unmount {
        target: PathBuf,
    },
    ProbeFormat {
        device: PathBuf,
    },
    MakeFs {
        device: PathBuf,
        fstype: String,
    },
    CheckFs {
        device: PathBuf,
    },
    Resize2fs {
        device: PathBuf,
    },
    XfsGrowfs {
        mount_path: PathBuf,
    },
}

/// Shared state for FakeHal operations.
#[derive(Debug, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Paths that currently exist
    paths: HashSet<PathBuf>,
    /// Paths that will exist once the given number of further sleeps complete
    pending_paths: Vec<(PathBuf, usize)>,
    /// Paths whose stat fails with the given error kind
    stat_errors: HashMap<PathBuf, io::ErrorKind>,
    /// Paths whose stat fails with the given errno
    stat_errnos: HashMap<PathBuf, nix::errno::Errno>,
    /// Directory listings
    dirs: HashMap<PathBuf, Vec<String>>,
    /// Paths whose writes fail
    failing_writes: HashSet<PathBuf>,
    /// Programs that exit non-zero
    failing_commands: HashSet<String>,
    /// Current mount table
    mounts: Vec<MountInfo>,
    /// Device formats reported by probe_format
    formats: HashMap<PathBuf, DiskFormat>,
    /// fsck results reported by check_fs (default: clean)
    fsck_outcomes: HashMap<PathBuf, FsckOutcome>,
    /// Block in sleep() on the cancel token instead of returning at once
    real_clock: bool,
    /// Cancel this token when the n-th sleep starts
    cancel_on_sleep: Option<(CancelToken, usize)>,
    sleeps: usize,
}

/// Fake HAL implementation that records operations without executing them.
///
/// This is designed for testing and CI environments where real system
/// operations would fail or be dangerous.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sleeps actually wait (interruptibly) for their duration.
    pub fn with_real_clock(self) -> Self {
        self.state().real_clock = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, FakeHalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state().operations.iter().any(check)
    }

    /// Count the recorded operations matching `check`.
    pub fn count_operations(&self, check: impl Fn(&Operation) -> bool) -> usize {
        self.state().operations.iter().filter(|op| check(op)).count()
    }

    /// Clear all recorded operations.
    pub fn clear(&self) {
        self.state().operations.clear();
    }

    /// Make `path` exist.
    pub fn add_path(&self, path: impl Into<PathBuf>) {
        self.state().paths.insert(path.into());
    }

    /// Make `path` exist once `sleeps` more sleeps have completed.
    pub fn add_path_after_sleeps(&self, path: impl Into<PathBuf>, sleeps: usize) {
        let path = path.into();
        let mut state = self.state();
        if sleeps == 0 {
            state.paths.insert(path);
        } else {
            state.pending_paths.push((path, sleeps));
        }
    }

    /// Make stat of `path` fail with `kind`.
    pub fn fail_stat(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.state().stat_errors.insert(path.into(), kind);
    }

    /// Make stat of `path` fail with a raw OS error, as a broken mount point does.
    pub fn fail_stat_errno(&self, path: impl Into<PathBuf>, errno: nix::errno::Errno) {
        self.state().stat_errnos.insert(path.into(), errno);
    }

    /// Register a directory and its entry names.
    pub fn add_dir<I, S>(&self, dir: impl Into<PathBuf>, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dir = dir.into();
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        let mut state = self.state();
        for name in &entries {
            state.paths.insert(dir.join(name));
        }
        state.paths.insert(dir.clone());
        state.dirs.insert(dir, entries);
    }

    /// Make writes to `path` fail with permission denied.
    pub fn fail_write(&self, path: impl Into<PathBuf>) {
        self.state().failing_writes.insert(path.into());
    }

    /// Make `program` exit with status 1.
    pub fn fail_command(&self, program: impl Into<String>) {
        self.state().failing_commands.insert(program.into());
    }

    /// Report `format` for `device` in probe_format.
    pub fn set_format(&self, device: impl Into<PathBuf>, format: DiskFormat) {
        self.state().formats.insert(device.into(), format);
    }

    /// Report `outcome` for `device` in check_fs.
    pub fn set_fsck_outcome(&self, device: impl Into<PathBuf>, outcome: FsckOutcome) {
        self.state().fsck_outcomes.insert(device.into(), outcome);
    }

    /// Seed a mount table entry.
    pub fn add_mount(&self, source: &str, mount_point: impl Into<PathBuf>, fstype: &str) {
        self.state().mounts.push(MountInfo {
            mount_point: mount_point.into(),
            fstype: fstype.to_string(),
            source: source.to_string(),
        });
    }

    /// Cancel `token` when the `nth` sleep (1-based) is requested.
    pub fn cancel_on_sleep(&self, token: CancelToken, nth: usize) {
        self.state().cancel_on_sleep = Some((token, nth));
    }

    fn record_operation(&self, op: Operation) {
        self.state().operations.push(op);
    }
}

fn exit_status(code: i32) -> std::process::ExitStatus {
    // Raw wait status: exit code lives in the second byte.
    std::process::ExitStatus::from_raw(code << 8)
}

impl FsOps for FakeHal {
    fn path_exists(&self, path: &Path) -> HalResult<bool> {
        self.record_operation(Operation::Stat {
            path: path.to_path_buf(),
        });
        let state = self.state();
        if let Some(kind) = state.stat_errors.get(path) {
            return Err(HalError::Io(io::Error::from(*kind)));
        }
        if let Some(errno) = state.stat_errnos.get(path) {
            return Err(HalError::Io(io::Error::from_raw_os_error(*errno as i32)));
        }
        Ok(state.paths.contains(path))
    }

    fn read_dir_names(&self, dir: &Path) -> HalResult<Vec<String>> {
        self.record_operation(Operation::ReadDir {
            dir: dir.to_path_buf(),
        });
        self.state()
            .dirs
            .get(dir)
            .cloned()
            .ok_or_else(|| HalError::Io(io::Error::from(io::ErrorKind::NotFound)))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> HalResult<()> {
        self.record_operation(Operation::WriteFile {
            path: path.to_path_buf(),
            contents: contents.to_vec(),
        });
        let mut state = self.state();
        if state.failing_writes.contains(path) {
            return Err(HalError::Io(io::Error::from(
                io::ErrorKind::PermissionDenied,
            )));
        }
        state.paths.insert(path.to_path_buf());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> HalResult<()> {
        self.record_operation(Operation::CreateDir {
            path: path.to_path_buf(),
        });
        let mut state = self.state();
        for ancestor in path.ancestors() {
            state.paths.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn create_file(&self, path: &Path) -> HalResult<()> {
        self.record_operation(Operation::CreateFile {
            path: path.to_path_buf(),
        });
        self.state().paths.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> HalResult<()> {
        self.record_operation(Operation::RemoveDir {
            path: path.to_path_buf(),
        });
        if self.state().paths.remove(path) {
            Ok(())
        } else {
            Err(HalError::Io(io::Error::from(io::ErrorKind::NotFound)))
        }
    }
}

impl ProcessOps for FakeHal {
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output> {
        self.record_operation(Operation::Command {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout_secs: timeout.as_secs(),
        });
        let code = if self.state().failing_commands.contains(program) {
            1
        } else {
            0
        };

        Ok(Output {
            status: exit_status(code),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }

    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()> {
        let output = self.command_output(program, args, timeout)?;
        if !output.status.success() {
            return Err(HalError::CommandFailed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

impl ClockOps for FakeHal {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> SleepOutcome {
        let real_clock = {
            let mut state = self.state();
            state.sleeps += 1;
            if let Some((token, nth)) = &state.cancel_on_sleep {
                if state.sleeps >= *nth {
                    token.cancel();
                }
            }
            state.real_clock
        };

        // The state lock must not be held while blocking.
        let outcome = if real_clock {
            cancel.wait_timeout(duration)
        } else if cancel.is_cancelled() {
            SleepOutcome::Cancelled
        } else {
            SleepOutcome::Elapsed
        };
        if outcome == SleepOutcome::Cancelled {
            return outcome;
        }

        let mut state = self.state();
        state.operations.push(Operation::Sleep { duration });
        let mut still_pending = Vec::new();
        for (path, remaining) in std::mem::take(&mut state.pending_paths) {
            if remaining <= 1 {
                state.paths.insert(path);
            } else {
                still_pending.push((path, remaining - 1));
            }
        }
        state.pending_paths = still_pending;
        SleepOutcome::Elapsed
    }
}

impl MountOps for FakeHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()> {
        log::info!(
            "FAKE HAL: mount {} -> {} (type: {:?})",
            device.display(),
            target.display(),
            fstype
        );

        self.record_operation(Operation::Mount {
            device: device.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.map(String::from),
            options: options.options.clone(),
        });
        self.state().mounts.push(MountInfo {
            mount_point: target.to_path_buf(),
            fstype: fstype.unwrap_or_default().to_string(),
            source: device.display().to_string(),
        });

        Ok(())
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        log::info!("FAKE HAL: unmount {}", target.display());

        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
        });
        let mut state = self.state();
        match state.mounts.iter().rposition(|m| m.mount_point == target) {
            Some(idx) => {
                state.mounts.remove(idx);
                Ok(())
            }
            None => Err(HalError::Nix(nix::errno::Errno::EINVAL)),
        }
    }

    fn mount_entries(&self) -> HalResult<Vec<MountInfo>> {
        Ok(self.state().mounts.clone())
    }
}

impl FormatOps for FakeHal {
    fn probe_format(&self, device: &Path) -> HalResult<DiskFormat> {
        self.record_operation(Operation::ProbeFormat {
            device: device.to_path_buf(),
        });
        Ok(self
            .state()
            .formats
            .get(device)
            .cloned()
            .unwrap_or(DiskFormat::Unformatted))
    }

    fn make_fs(&self, device: &Path, fstype: &str, _opts: &FormatOptions) -> HalResult<()> {
        self.record_operation(Operation::MakeFs {
            device: device.to_path_buf(),
            fstype: fstype.to_string(),
        });
        self.state().formats.insert(
            device.to_path_buf(),
            DiskFormat::Filesystem(fstype.to_string()),
        );
        Ok(())
    }

    fn check_fs(&self, device: &Path) -> HalResult<FsckOutcome> {
        self.record_operation(Operation::CheckFs {
            device: device.to_path_buf(),
        });
        Ok(self
            .state()
            .fsck_outcomes
            .get(device)
            .copied()
            .unwrap_or(FsckOutcome::Clean))
    }
}

impl ResizeOps for FakeHal {
    fn resize2fs(&self, device: &Path) -> HalResult<()> {
        self.record_operation(Operation::Resize2fs {
            device: device.to_path_buf(),
        });
        Ok(())
    }

    fn xfs_growfs(&self, mount_path: &Path) -> HalResult<()> {
        self.record_operation(Operation::XfsGrowfs {
            mount_path: mount_path.to_path_buf(),
        });
        Ok(())
    }
}
