//! Parsing helpers for `/proc/self/mountinfo` (and similar mountinfo files).

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub mount_point: PathBuf,
    pub fstype: String,
    pub source: String,
}

pub fn parse_mountinfo(content: &str) -> Vec<MountInfo> {
    content
        .lines()
        .filter_map(|line| {
            // mountinfo format:
            //   <pre fields...> <mount point> <...> - <fstype> <source> <superopts>
            let (pre, post) = line.split_once(" - ")?;
            let pre_fields: Vec<&str> = pre.split_whitespace().collect();
            if pre_fields.len() < 5 {
                return None;
            }
            let mount_point = unescape_mount_path(pre_fields[4]);
            let mut post_fields = post.split_whitespace();
            let fstype = post_fields.next()?.to_string();
            let source = unescape_mount_path(post_fields.next()?);
            Some(MountInfo {
                mount_point: PathBuf::from(mount_point),
                fstype,
                source,
            })
        })
        .collect()
}

pub fn is_mounted_from_info(path: &Path, entries: &[MountInfo]) -> bool {
    find_mount(path, entries).is_some()
}

/// Last entry mounted exactly at `path` (later mounts shadow earlier ones).
pub fn find_mount<'a>(path: &Path, entries: &'a [MountInfo]) -> Option<&'a MountInfo> {
    let target = normalize_path(path);
    entries
        .iter()
        .rev()
        .find(|entry| normalize_path(&entry.mount_point) == target)
}

/// Mount points whose source is exactly `source`, sorted and deduplicated.
pub fn mount_points_for_source(source: &str, entries: &[MountInfo]) -> Vec<PathBuf> {
    let mut mounts: Vec<PathBuf> = entries
        .iter()
        .filter(|entry| entry.source == source)
        .map(|entry| entry.mount_point.clone())
        .collect();
    mounts.sort();
    mounts.dedup();
    mounts
}

pub fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.len() > 1 && s.ends_with('/') {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
36 28 0:31 / / rw,relatime - ext4 /dev/sda3 rw
37 28 8:16 / /var/lib/kubelet/plugins/pv-1/globalmount rw,relatime - ext4 /dev/sdb rw
38 28 8:16 / /var/lib/kubelet/pods/abc/volumes/pv-1/mount rw,relatime - ext4 /dev/sdb rw
39 28 0:45 / /run rw,nosuid - tmpfs tmpfs rw
";

    #[test]
    fn parse_mountinfo_reads_mount_point_fstype_and_source() {
        let entries = parse_mountinfo(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].source, "/dev/sdb");
        assert_eq!(entries[1].fstype, "ext4");
        assert_eq!(entries[3].fstype, "tmpfs");
    }

    #[test]
    fn parse_mountinfo_skips_malformed_lines() {
        let entries = parse_mountinfo("garbage\n36 28 0:31 / - ext4\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn is_mounted_from_info_matches_paths() {
        let sample = "36 28 0:31 / / rw,relatime - ext4 /dev/sda3 rw\n";
        let entries = parse_mountinfo(sample);
        assert!(is_mounted_from_info(Path::new("/"), &entries));
        assert!(!is_mounted_from_info(Path::new("/mnt"), &entries));
    }

    #[test]
    fn find_mount_ignores_trailing_slash() {
        let entries = parse_mountinfo(SAMPLE);
        let found = find_mount(
            Path::new("/var/lib/kubelet/plugins/pv-1/globalmount/"),
            &entries,
        )
        .unwrap();
        assert_eq!(found.source, "/dev/sdb");
    }

    #[test]
    fn mountinfo_unescapes_paths() {
        let sample = "36 28 0:31 / /mnt/data\\040disk rw,relatime - ext4 /dev/sda3 rw\n";
        let entries = parse_mountinfo(sample);
        assert_eq!(entries[0].mount_point, PathBuf::from("/mnt/data disk"));
    }

    #[test]
    fn mount_points_for_source_lists_every_reference() {
        let entries = parse_mountinfo(SAMPLE);
        let mounts = mount_points_for_source("/dev/sdb", &entries);
        assert_eq!(
            mounts,
            vec![
                PathBuf::from("/var/lib/kubelet/plugins/pv-1/globalmount"),
                PathBuf::from("/var/lib/kubelet/pods/abc/volumes/pv-1/mount"),
            ]
        );
        assert!(mount_points_for_source("/dev/sdz", &entries).is_empty());
    }
}
