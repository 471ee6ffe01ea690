//! Best-effort bus rescans used while waiting for a hot-plugged volume.

use crate::mounter::Mounter;
use std::path::Path;
use volmount_hal::{CancelToken, SystemHal};

pub const SCSI_HOST_PATH: &str = "/sys/class/scsi_host/";

/// Wildcard channel, target and LUN.
pub const SCSI_SCAN_PAYLOAD: &[u8] = b"- - -";

const UDEVADM: &str = "udevadm";

impl<H: SystemHal> Mounter<H> {
    /// Ask every SCSI host to rescan, then replay udev events.
    ///
    /// Failures are logged and swallowed; this never fails the caller.
    pub fn trigger_rescan(&self, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            log::debug!("Skipping rescan, lookup already cancelled");
            return;
        }
        log::debug!("Scanning SCSI host");
        self.rescan_scsi_hosts();
        self.udev_trigger();
    }

    fn rescan_scsi_hosts(&self) {
        let hosts = match self.hal().read_dir_names(Path::new(SCSI_HOST_PATH)) {
            Ok(hosts) => hosts,
            Err(err) => {
                log::error!("Failed to read dir {SCSI_HOST_PATH}: {err}");
                return;
            }
        };

        for host in hosts {
            let scan = Path::new(SCSI_HOST_PATH).join(&host).join("scan");
            log::debug!("Triggering SCSI host rescan of {}", scan.display());
            if let Err(err) = self.hal().write_file(&scan, SCSI_SCAN_PAYLOAD) {
                log::error!("Failed to rescan scsi host {}: {err}", scan.display());
            }
        }
    }

    fn udev_trigger(&self) {
        let timeout = self.config().commands.udevadm_timeout();
        match self.hal().command_output(UDEVADM, &["trigger"], timeout) {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                log::error!(
                    "Error running udevadm trigger (exit={:?}): {}",
                    output.status.code(),
                    combined.trim()
                );
            }
            Err(err) => log::error!("Error running udevadm trigger: {err}"),
        }
    }
}
