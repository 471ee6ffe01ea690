//! External command execution.
//!
//! blkid, mkfs, fsck, the resize tools and udevadm all run through this trait,
//! so discovery and formatting can be tested without spawning processes.

use crate::HalResult;
use std::process::Output;
use std::time::Duration;

/// Runs a program to completion, killing it once `timeout` passes.
pub trait ProcessOps {
    /// Run `program` and capture its output whatever the exit status.
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output>;

    /// Run `program`, turning a non-zero exit into [`crate::HalError::CommandFailed`].
    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()>;
}
