//! Network-filesystem detection used to pick a per-volume notification
//! backend.
//!
//! Native OS notifications (inotify, FSEvents, ReadDirectoryChangesW) are
//! unreliable or unsupported over NFS/CIFS mounts, so volumes whose container
//! root lives on a network filesystem fall back to a polling backend instead.
//! This is a one-time decision made at volume registration, not re-evaluated
//! per event.

use std::fs;
use std::path::Path;

const NETWORK_FS_TYPES: &[&str] = &[
    "nfs", "nfs3", "nfs4", "cifs", "smbfs", "smb3", "fuse.sshfs", "fuse.s3fs", "afpfs", "9p",
];

/// Best-effort detection of whether `path` lives on a network filesystem, by
/// inspecting `/proc/mounts` and picking the longest matching mount point
/// prefix. Returns `false` (native backend preferred) if the mount table
/// can't be read, e.g. on non-Linux platforms or in restricted containers.
pub fn is_network_mount(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string("/proc/mounts") else {
        return false;
    };
    longest_prefix_is_network(&contents, path)
}

fn longest_prefix_is_network(mounts_table: &str, path: &Path) -> bool {
    let mut best_match: Option<(usize, bool)> = None;
    for line in mounts_table.lines() {
        // `/proc/mounts` fields: device, mount_point, fs_type, ...
        let mut fields = line.split_whitespace();
        let Some(_device) = fields.next() else { continue };
        let Some(mount_point) = fields.next() else { continue };
        let Some(fs_type) = fields.next() else { continue };

        let mount_path = Path::new(mount_point);
        if path.starts_with(mount_path) {
            let depth = mount_point.len();
            let is_network = NETWORK_FS_TYPES.contains(&fs_type);
            if best_match.is_none_or(|(best_depth, _)| depth > best_depth) {
                best_match = Some((depth, is_network));
            }
        }
    }
    best_match.map(|(_, is_network)| is_network).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
sysfs /sys sysfs rw 0 0
/dev/sda1 / ext4 rw,relatime 0 0
nas.local:/export/photos /nas/photos nfs4 rw,relatime 0 0
//nas.local/docs /nas/docs cifs rw 0 0
";

    #[test]
    fn detects_nfs_mount_by_longest_prefix() {
        assert!(is_network_mount_with_table(
            SAMPLE,
            Path::new("/nas/photos/a/b.jpg")
        ));
    }

    #[test]
    fn detects_cifs_mount() {
        assert!(is_network_mount_with_table(SAMPLE, Path::new("/nas/docs/report.pdf")));
    }

    #[test]
    fn local_ext4_root_is_not_network() {
        assert!(!is_network_mount_with_table(SAMPLE, Path::new("/home/user/file.txt")));
    }

    fn is_network_mount_with_table(table: &str, path: &Path) -> bool {
        longest_prefix_is_network(table, path)
    }
}
