//! Volume ID to device path resolution.
//!
//! After a volume is attached to the VM the guest kernel may take a while to
//! enumerate it. Resolution polls the by-id namespace under a backoff
//! schedule, nudging the SCSI hosts and udev between attempts.

use crate::backoff::Backoff;
use crate::mounter::Mounter;
use crate::serial::disk_uuid_to_serial;
use std::path::{Path, PathBuf};
use std::time::Duration;
use volmount_error::{MountError, MountResult};
use volmount_hal::{CancelToken, SleepOutcome, SystemHal};

pub const DISK_ID_PATH: &str = "/dev/disk/by-id";

/// Naming conventions tried in order: virtio-blk, SCSI, then QEMU's emulated SCSI disk.
pub const SOURCE_PATH_PREFIXES: [&str; 3] = ["virtio-", "scsi-", "scsi-0QEMU_QEMU_HARDDISK_"];

/// Candidate by-id paths for a serial, in probe order.
pub fn candidate_paths(serial: &str) -> Vec<PathBuf> {
    SOURCE_PATH_PREFIXES
        .iter()
        .map(|prefix| Path::new(DISK_ID_PATH).join(format!("{prefix}{serial}")))
        .collect()
}

/// What the resolution loop does after a probe.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Transition {
    Found(PathBuf),
    /// Rescan, wait this long, probe again.
    Retry(Duration),
    Exhausted,
}

pub(crate) fn next_transition(found: Option<PathBuf>, schedule: &mut Backoff) -> Transition {
    match found {
        Some(path) => Transition::Found(path),
        None => match schedule.next_delay() {
            Some(delay) => Transition::Retry(delay),
            None => Transition::Exhausted,
        },
    }
}

impl<H: SystemHal> Mounter<H> {
    /// Resolve `volume_id` to its device under `/dev/disk/by-id`.
    ///
    /// Gives up with [`MountError::DeviceNotFound`] once the backoff schedule
    /// is exhausted or `cancel` fires. A stat failure other than "not found"
    /// is returned immediately.
    pub fn get_device_path(&self, cancel: &CancelToken, volume_id: &str) -> MountResult<PathBuf> {
        let serial = disk_uuid_to_serial(volume_id);
        let mut schedule = self.config().backoff.schedule();
        log::debug!(
            "Looking up device for volume {volume_id:?} (serial {serial:?}), waiting up to {:?}",
            schedule.total_delay()
        );

        let mut attempt = 0u32;
        let device_path = loop {
            if cancel.is_cancelled() {
                log::info!("Device lookup for volume {volume_id:?} cancelled after {attempt} attempts");
                return Err(MountError::DeviceNotFound {
                    volume_id: volume_id.to_string(),
                });
            }

            attempt += 1;
            let found = self.device_path_by_serial(&serial)?;
            match next_transition(found, &mut schedule) {
                Transition::Found(path) => break path,
                Transition::Exhausted => {
                    log::info!("No device for volume {volume_id:?} after {attempt} attempts");
                    return Err(MountError::DeviceNotFound {
                        volume_id: volume_id.to_string(),
                    });
                }
                Transition::Retry(delay) => {
                    self.trigger_rescan(cancel);
                    log::debug!("Device for volume {volume_id:?} not present yet, retrying in {delay:?}");
                    if self.hal().sleep(delay, cancel) == SleepOutcome::Cancelled {
                        log::info!("Device lookup for volume {volume_id:?} cancelled while waiting");
                        return Err(MountError::DeviceNotFound {
                            volume_id: volume_id.to_string(),
                        });
                    }
                }
            }
        };

        if device_path.as_os_str().is_empty() {
            return Err(MountError::EmptyDevicePath {
                volume_id: volume_id.to_string(),
            });
        }

        log::info!(
            "Found device {} for volume {volume_id:?}",
            device_path.display()
        );
        Ok(device_path)
    }

    /// First existing candidate for `serial`, if any.
    fn device_path_by_serial(&self, serial: &str) -> MountResult<Option<PathBuf>> {
        for source in candidate_paths(serial) {
            if self.hal().path_exists(&source)? {
                return Ok(Some(source));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MounterConfig;
    use std::io;
    use volmount_hal::{FakeHal, Operation};

    const VOLUME: &str = "2f1e8a3c-5b7d-4e9f-a1c2-3d4e5f6a7b8c";
    const SERIAL: &str = "2f1e8a3c5b7d4e9fa1c2";

    fn by_id(prefix: &str) -> PathBuf {
        PathBuf::from(format!("{DISK_ID_PATH}/{prefix}{SERIAL}"))
    }

    fn sleeps(hal: &FakeHal) -> usize {
        hal.count_operations(|op| matches!(op, Operation::Sleep { .. }))
    }

    fn rescans(hal: &FakeHal) -> usize {
        hal.count_operations(|op| matches!(op, Operation::Command { program, .. } if program == "udevadm"))
    }

    fn stats(hal: &FakeHal) -> usize {
        hal.count_operations(|op| matches!(op, Operation::Stat { .. }))
    }

    #[test]
    fn candidate_paths_follow_prefix_priority() {
        assert_eq!(
            candidate_paths("abc"),
            vec![
                PathBuf::from("/dev/disk/by-id/virtio-abc"),
                PathBuf::from("/dev/disk/by-id/scsi-abc"),
                PathBuf::from("/dev/disk/by-id/scsi-0QEMU_QEMU_HARDDISK_abc"),
            ]
        );
    }

    #[test]
    fn next_transition_prefers_found_path() {
        let mut schedule = Backoff::default();
        let path = PathBuf::from("/dev/disk/by-id/virtio-x");
        assert_eq!(
            next_transition(Some(path.clone()), &mut schedule),
            Transition::Found(path)
        );
        // A hit does not consume the schedule.
        assert_eq!(schedule, Backoff::default());

        let mut last = Backoff {
            steps: 1,
            ..Backoff::default()
        };
        assert_eq!(next_transition(None, &mut last), Transition::Exhausted);
    }

    #[test]
    fn existing_device_is_found_without_rescan_or_sleep() {
        let hal = FakeHal::new();
        hal.add_path(by_id("scsi-"));
        let mounter = Mounter::new(hal.clone());

        let path = mounter
            .get_device_path(&CancelToken::new(), VOLUME)
            .unwrap();

        assert_eq!(path, by_id("scsi-"));
        assert_eq!(sleeps(&hal), 0);
        assert_eq!(rescans(&hal), 0);
    }

    #[test]
    fn earlier_prefix_wins_when_several_exist() {
        let hal = FakeHal::new();
        hal.add_path(by_id("scsi-0QEMU_QEMU_HARDDISK_"));
        hal.add_path(by_id("scsi-"));
        hal.add_path(by_id("virtio-"));
        let mounter = Mounter::new(hal.clone());

        let path = mounter
            .get_device_path(&CancelToken::new(), VOLUME)
            .unwrap();
        assert_eq!(path, by_id("virtio-"));
        assert_eq!(stats(&hal), 1);

        let hal = FakeHal::new();
        hal.add_path(by_id("scsi-0QEMU_QEMU_HARDDISK_"));
        hal.add_path(by_id("scsi-"));
        let path = Mounter::new(hal)
            .get_device_path(&CancelToken::new(), VOLUME)
            .unwrap();
        assert_eq!(path, by_id("scsi-"));
    }

    #[test]
    fn device_appearing_after_rescan_is_found_on_second_probe() {
        let hal = FakeHal::new();
        hal.add_path_after_sleeps(by_id("virtio-"), 1);
        let mounter = Mounter::new(hal.clone());

        let path = mounter
            .get_device_path(&CancelToken::new(), VOLUME)
            .unwrap();

        assert_eq!(path, by_id("virtio-"));
        assert_eq!(sleeps(&hal), 1);
        assert_eq!(rescans(&hal), 1);
        assert!(hal.has_operation(|op| *op
            == Operation::Sleep {
                duration: Duration::from_secs(1)
            }));
    }

    #[test]
    fn missing_device_exhausts_all_fifteen_attempts() {
        let hal = FakeHal::new();
        let mounter = Mounter::new(hal.clone());

        let err = mounter
            .get_device_path(&CancelToken::new(), VOLUME)
            .unwrap_err();

        assert!(matches!(err, MountError::DeviceNotFound { ref volume_id } if volume_id == VOLUME));
        assert!(err.is_retryable());
        assert_eq!(stats(&hal), 15 * SOURCE_PATH_PREFIXES.len());
        assert_eq!(sleeps(&hal), 14);
        assert_eq!(rescans(&hal), 14);
    }

    #[test]
    fn schedule_from_config_bounds_attempts() {
        let hal = FakeHal::new();
        let mut config = MounterConfig::default();
        config.backoff.steps = 3;
        config.backoff.initial_delay_ms = 200;
        config.backoff.factor = 2.0;
        let mounter = Mounter::with_config(hal.clone(), config).unwrap();

        assert!(mounter
            .get_device_path(&CancelToken::new(), VOLUME)
            .is_err());
        let waits: Vec<Duration> = hal
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Sleep { duration } => Some(duration),
                _ => None,
            })
            .collect();
        assert_eq!(
            waits,
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[test]
    fn cancelled_context_returns_not_found_without_probing() {
        let hal = FakeHal::new();
        hal.add_path(by_id("virtio-"));
        let token = CancelToken::new();
        token.cancel();

        let err = Mounter::new(hal.clone())
            .get_device_path(&token, VOLUME)
            .unwrap_err();

        assert!(matches!(err, MountError::DeviceNotFound { .. }));
        assert_eq!(stats(&hal), 0);
    }

    #[test]
    fn cancellation_during_backoff_stops_promptly() {
        let hal = FakeHal::new();
        let token = CancelToken::new();
        hal.cancel_on_sleep(token.clone(), 3);

        let err = Mounter::new(hal.clone())
            .get_device_path(&token, VOLUME)
            .unwrap_err();

        assert!(matches!(err, MountError::DeviceNotFound { .. }));
        // Two completed waits, the third was interrupted; no further probing.
        assert_eq!(sleeps(&hal), 2);
        assert_eq!(stats(&hal), 3 * SOURCE_PATH_PREFIXES.len());
    }

    #[test]
    fn permission_denied_aborts_immediately() {
        let hal = FakeHal::new();
        hal.fail_stat(by_id("virtio-"), io::ErrorKind::PermissionDenied);
        hal.add_path(by_id("scsi-"));

        let err = Mounter::new(hal.clone())
            .get_device_path(&CancelToken::new(), VOLUME)
            .unwrap_err();

        match err {
            MountError::Hal(inner) => assert!(!inner.is_not_found()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!MountError::Hal(volmount_error::HalError::Busy).is_retryable());
        assert_eq!(stats(&hal), 1);
        assert_eq!(sleeps(&hal), 0);
        assert_eq!(rescans(&hal), 0);
    }

    #[test]
    fn hard_error_on_later_prefix_still_aborts() {
        let hal = FakeHal::new();
        hal.fail_stat(by_id("scsi-"), io::ErrorKind::Other);

        let err = Mounter::new(hal.clone())
            .get_device_path(&CancelToken::new(), VOLUME)
            .unwrap_err();

        assert!(matches!(err, MountError::Hal(_)));
        assert_eq!(stats(&hal), 2);
        assert_eq!(sleeps(&hal), 0);
    }

    #[test]
    fn short_volume_ids_are_used_verbatim() {
        let hal = FakeHal::new();
        hal.add_path("/dev/disk/by-id/virtio-abcdef");

        let path = Mounter::new(hal)
            .get_device_path(&CancelToken::new(), "abcd-ef")
            .unwrap();
        assert_eq!(path, PathBuf::from("/dev/disk/by-id/virtio-abcdef"));
    }
}
