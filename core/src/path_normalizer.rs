//! Maps a live container-local path to a stable logical path rooted at a
//! volume name.
//!
//! A pure function: no I/O beyond path arithmetic. Given the configured
//! volumes and a live filesystem path, finds the first volume whose
//! container root is a prefix of the path and builds
//! `"/" + name + "/" + relative_path"`. If no volume matches, the input is
//! returned unchanged (and the caller is expected to log a warning).

use std::ffi::OsStr;
use std::path::Path;

use tracing::warn;

use crate::volume::Volume;

/// Result of normalizing a container path against the configured volumes.
///
/// Carries two representations of the same logical path: `display`, a
/// lossily-decoded `String` used for every text field (JSON, logs, index
/// queries), and `raw`, the original path bytes used only for the
/// deterministic id hash (§4.1/§8: the id hash is computed over the byte
/// sequence, not the lossy-decoded string, so two distinct non-UTF-8 paths
/// that happen to lossy-decode to the same display string still hash
/// differently).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPath {
    display: String,
    raw: Vec<u8>,
}

impl LogicalPath {
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// The original byte sequence of the logical path, suitable for hashing.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Directory depth: the number of path segments below the volume root,
    /// i.e. `segments(logical_path) - 2` (the leading empty segment and the
    /// volume name itself are excluded).
    pub fn directory_depth(&self) -> usize {
        self.display
            .split('/')
            .filter(|s| !s.is_empty())
            .count()
            .saturating_sub(2)
    }
}

impl std::fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

/// Normalizes `container_path` against `volumes`, returning the first match.
/// Falls back to the input path (lossily decoded) if no volume contains it,
/// logging a warning since this indicates misconfiguration or an event from
/// outside any configured root.
pub fn normalize(volumes: &[Volume], container_path: &Path) -> LogicalPath {
    for volume in volumes {
        if let Ok(relative) = container_path.strip_prefix(&volume.container_root) {
            let mut raw = Vec::with_capacity(volume.name.len() + relative.as_os_str().len() + 2);
            raw.push(b'/');
            raw.extend_from_slice(volume.name.as_bytes());
            raw.push(b'/');
            for byte in os_str_bytes(relative.as_os_str()).iter() {
                raw.push(if *byte == b'\\' { b'/' } else { *byte });
            }

            let rel = relative.to_string_lossy().replace('\\', "/");
            let display = format!("/{}/{}", volume.name, rel);
            return LogicalPath { display, raw };
        }
    }

    warn!(path = %container_path.display(), "path does not belong to any configured volume");
    let display = container_path.to_string_lossy().into_owned();
    let raw = os_str_bytes(container_path.as_os_str()).into_owned();
    LogicalPath { display, raw }
}

/// Raw bytes of an `OsStr`. On Unix this is exact (paths are arbitrary byte
/// sequences); on other platforms there is no such guarantee exposed by
/// `std`, so this falls back to the lossy-decoded UTF-8 bytes, which is no
/// worse than the rest of the stack does for non-Unix targets.
#[cfg(unix)]
fn os_str_bytes(s: &OsStr) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(s.as_bytes())
}

#[cfg(not(unix))]
fn os_str_bytes(s: &OsStr) -> std::borrow::Cow<'_, [u8]> {
    std::borrow::Cow::Owned(s.to_string_lossy().into_owned().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volumes() -> Vec<Volume> {
        vec![
            Volume::new("photos", "/nas/photos"),
            Volume::new("docs", "/nas/docs"),
        ]
    }

    #[test]
    fn maps_container_path_to_logical_path() {
        let logical = normalize(&volumes(), Path::new("/nas/photos/a/b.jpg"));
        assert_eq!(logical.as_str(), "/photos/a/b.jpg");
        assert_eq!(logical.directory_depth(), 1);
    }

    #[test]
    fn picks_first_matching_volume() {
        let logical = normalize(&volumes(), Path::new("/nas/docs/report.pdf"));
        assert_eq!(logical.as_str(), "/docs/report.pdf");
        assert_eq!(logical.directory_depth(), 0);
    }

    #[test]
    fn falls_back_to_input_when_no_volume_matches() {
        let logical = normalize(&volumes(), Path::new("/elsewhere/file.txt"));
        assert_eq!(logical.as_str(), "/elsewhere/file.txt");
    }

    #[test]
    fn root_level_file_has_zero_depth() {
        let logical = normalize(&volumes(), Path::new("/nas/photos/b.jpg"));
        assert_eq!(logical.directory_depth(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_with_same_lossy_decode_keep_distinct_raw_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        // 0xFF and 0xFE both lossy-decode to U+FFFD, so the display strings
        // collide; the raw bytes used for hashing must not.
        let a = normalize(&volumes(), Path::new(OsStr::from_bytes(b"/nas/photos/\xFF.jpg")));
        let b = normalize(&volumes(), Path::new(OsStr::from_bytes(b"/nas/photos/\xFE.jpg")));
        assert_eq!(a.as_str(), b.as_str());
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
