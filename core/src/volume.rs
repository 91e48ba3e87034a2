//! A named filesystem root configured for indexing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A `(name, container_path)` pair. The logical path of a file under a volume
/// is `"/" + name + "/" + relative_path`; the container path is used only for
/// I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub container_root: PathBuf,
}

impl Volume {
    pub fn new(name: impl Into<String>, container_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            container_root: container_root.into(),
        }
    }

    /// Parses the `MOUNT_PATHS` environment convention: a comma-separated
    /// list of container paths, each named by its final path segment.
    pub fn parse_mount_paths(raw: &str) -> Vec<Volume> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| {
                let root = Path::new(s);
                let name = root.file_name()?.to_string_lossy().into_owned();
                Some(Volume::new(name, root))
            })
            .collect()
    }
}
