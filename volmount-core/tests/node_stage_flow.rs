use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use volmount_core::{
    CancelToken, FakeHal, MountError, MountOptions, Mounter, MounterConfig, SCSI_HOST_PATH,
};
use volmount_hal::{DiskFormat, FormatOps, MountOps, Operation};

const STAGING: &str = "/var/lib/kubelet/plugins/kubernetes.io/csi/pv/pv-7/globalmount";

fn fast_config() -> MounterConfig {
    let mut config = MounterConfig::default();
    config.backoff.initial_delay_ms = 10;
    config
}

#[test]
fn hot_plugged_volume_is_found_formatted_mounted_and_cleaned_up() {
    let volume_id = "6a0e5c4d-1b2f-4a3e-9c8d-7f6e5d4c3b2a";
    let device = PathBuf::from("/dev/disk/by-id/scsi-0QEMU_QEMU_HARDDISK_6a0e5c4d1b2f4a3e9c8d");

    let hal = FakeHal::new();
    hal.add_dir(SCSI_HOST_PATH, ["host0"]);
    hal.add_path_after_sleeps(&device, 3);
    let mounter = Mounter::with_config(hal.clone(), fast_config()).unwrap();

    let found = mounter
        .get_device_path(&CancelToken::new(), volume_id)
        .unwrap();
    assert_eq!(found, device);
    assert_eq!(
        hal.count_operations(|op| matches!(op, Operation::WriteFile { .. })),
        3
    );

    mounter.make_dir(Path::new(STAGING)).unwrap();
    mounter
        .format_and_mount(&found, Path::new(STAGING), "ext4", &MountOptions::new())
        .unwrap();
    assert_eq!(
        hal.probe_format(&found).unwrap(),
        DiskFormat::Filesystem("ext4".to_string())
    );

    let (name, refs) = mounter.get_device_name(Path::new(STAGING)).unwrap();
    assert_eq!(name, device.display().to_string());
    assert_eq!(refs, 1);

    mounter
        .cleanup_mount_point(Path::new(STAGING), true)
        .unwrap();
    assert!(!hal.is_mounted(Path::new(STAGING)).unwrap());
    assert!(!mounter.exists_path(Path::new(STAGING)).unwrap());
}

#[test]
fn remounting_after_restart_keeps_data() {
    let hal = FakeHal::new();
    let device = "/dev/disk/by-id/virtio-0123456789abcdef0123";
    hal.add_path(device);
    hal.set_format(device, DiskFormat::Filesystem("xfs".to_string()));
    let mounter = Mounter::with_config(hal.clone(), fast_config()).unwrap();

    let found = mounter
        .get_device_path(&CancelToken::new(), "01234567-89ab-cdef-0123-456789abcdef")
        .unwrap();
    mounter
        .format_and_mount(&found, Path::new(STAGING), "", &MountOptions::new())
        .unwrap();

    assert!(!hal.has_operation(|op| matches!(op, Operation::MakeFs { .. })));
}

#[test]
fn concurrent_lookups_are_independent() {
    let hal = FakeHal::new();
    hal.add_path("/dev/disk/by-id/virtio-aaaaaaaa");
    hal.add_path("/dev/disk/by-id/scsi-bbbbbbbb");
    let mounter = Mounter::with_config(hal, fast_config()).unwrap();
    let token = CancelToken::new();

    let (a, b) = thread::scope(|s| {
        let a = s.spawn(|| mounter.get_device_path(&token, "aaaa-aaaa"));
        let b = s.spawn(|| mounter.get_device_path(&token, "bbbb-bbbb"));
        (a.join().unwrap(), b.join().unwrap())
    });

    assert_eq!(a.unwrap(), PathBuf::from("/dev/disk/by-id/virtio-aaaaaaaa"));
    assert_eq!(b.unwrap(), PathBuf::from("/dev/disk/by-id/scsi-bbbbbbbb"));
}

#[test]
fn cancellation_during_wait_surfaces_as_not_found() {
    let hal = FakeHal::new();
    let token = CancelToken::new();
    hal.cancel_on_sleep(token.clone(), 1);
    let mounter = Mounter::with_config(hal, fast_config()).unwrap();

    let err = mounter.get_device_path(&token, "never-attached").unwrap_err();
    assert!(matches!(err, MountError::DeviceNotFound { .. }));
    assert!(err.is_retryable());
}

#[test]
fn deadline_expiry_surfaces_as_not_found() {
    let hal = FakeHal::new().with_real_clock();
    let mut config = MounterConfig::default();
    config.backoff.initial_delay_ms = 200;
    let mounter = Mounter::with_config(hal.clone(), config).unwrap();
    let full_schedule = mounter.config().backoff.schedule().total_delay();
    assert!(full_schedule > Duration::from_secs(5));

    let token = CancelToken::with_timeout(Duration::from_millis(300));
    let start = Instant::now();
    let err = mounter.get_device_path(&token, "never-attached").unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, MountError::DeviceNotFound { ref volume_id } if volume_id == "never-attached"));
    assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    // The 200ms wait completed; the 220ms one was cut short by the deadline.
    assert_eq!(
        hal.count_operations(|op| matches!(op, Operation::Sleep { .. })),
        1
    );
}

#[test]
fn per_call_deadline_leaves_parent_token_usable() {
    let hal = FakeHal::new().with_real_clock();
    let mounter = Mounter::with_config(hal.clone(), fast_config()).unwrap();
    let root = CancelToken::new();

    let err = mounter
        .get_device_path(&root.child_with_timeout(Duration::from_millis(25)), "late-volume")
        .unwrap_err();
    assert!(matches!(err, MountError::DeviceNotFound { .. }));
    assert!(!root.is_cancelled());

    hal.add_path("/dev/disk/by-id/virtio-latevolume");
    let found = mounter.get_device_path(&root, "late-volume").unwrap();
    assert_eq!(found, PathBuf::from("/dev/disk/by-id/virtio-latevolume"));
}
