//! Startup and periodic full-tree rescans.
//!
//! A rescan walks every configured volume and runs the enqueue discipline
//! (`event_type = created`) for every supported file not already present in
//! `processed_files`. It exists to recover events missed while the process
//! was down or while native notifications were overflowing, and is the
//! safety net every non-fatal drop elsewhere in the pipeline relies on.

use std::time::Duration;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::path_normalizer;
use crate::state_store::StateStore;
use crate::volume::Volume;
use crate::watcher::enqueue;
use crate::watcher::filter;

const PROCESSED_FILES_SET: &str = "processed_files";

pub struct ScanOutcome {
    pub visited: usize,
    pub enqueued: usize,
}

/// Walks every volume once, enqueuing unsupported/noise/already-processed
/// files is skipped cheaply before ever hitting the state store.
pub async fn scan_all(
    store: &StateStore,
    volumes: &[Volume],
    global_lock_ttl: Duration,
    queue_lock_ttl: Duration,
    recency_window: Duration,
    file_hash_ttl: Duration,
) -> Result<ScanOutcome> {
    let mut outcome = ScanOutcome { visited: 0, enqueued: 0 };
    for volume in volumes {
        info!(volume = %volume.name, root = %volume.container_root.display(), "rescan starting");
        let files = walk_volume(volume);
        for path in files {
            outcome.visited += 1;
            let logical = path_normalizer::normalize(volumes, &path);
            match store.sismember(PROCESSED_FILES_SET, logical.as_str()).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "rescan: processed_files lookup failed, skipping this tick");
                    continue;
                }
            }

            match enqueue::try_enqueue(
                store,
                volumes,
                &path,
                crate::event::EventType::Created,
                global_lock_ttl,
                queue_lock_ttl,
                recency_window,
                file_hash_ttl,
            )
            .await
            {
                Ok(result) if result.enqueued => outcome.enqueued += 1,
                Ok(_) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "rescan: enqueue failed"),
            }
        }
        info!(volume = %volume.name, "rescan finished");
    }
    debug!(visited = outcome.visited, enqueued = outcome.enqueued, "rescan summary");
    Ok(outcome)
}

fn walk_volume(volume: &Volume) -> Vec<std::path::PathBuf> {
    WalkDir::new(&volume.container_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| !filter::is_noise_path(path) && filter::is_supported_extension(path))
        .collect()
}
