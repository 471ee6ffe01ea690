/// Longest serial the hypervisor exposes for a virtual disk.
pub const MAX_SERIAL_LEN: usize = 20;

/// Translate a volume UUID into the disk serial libvirt gives the guest.
///
/// This mirrors what CloudStack does with the KVM hypervisor: strip hyphens and
/// keep at most the first 20 characters. The result is what appears after the
/// bus prefix in `/dev/disk/by-id`.
pub fn disk_uuid_to_serial(uuid: &str) -> String {
    uuid.chars()
        .filter(|c| *c != '-')
        .take(MAX_SERIAL_LEN)
        .collect()
}
