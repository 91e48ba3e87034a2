//! Thumbnail worker: pulls `thumbnail_generation_queue`, renders three JPEG
//! sizes for images and video, and records their paths in the state store.

pub mod image_render;
pub mod video_render;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::event::FileEvent;
use crate::extractor::mime;
use crate::hashing::thumbnail_key;
use crate::state_store::StateStore;

const THUMBNAIL_QUEUE: &str = "thumbnail_generation_queue";

/// The three fixed output sizes, in the fixed order they're rendered and
/// recorded.
pub const SIZES: &[(&str, u32, u32)] = &[("small", 150, 150), ("medium", 300, 300), ("large", 800, 600)];

/// Starts `config.thumbnail_workers` concurrent loops, each blocking on
/// `thumbnail_generation_queue` with a 1s timeout, until `shutdown` fires.
pub async fn run_workers(store: StateStore, config: Config, shutdown: watch::Receiver<bool>) {
    let mut handles = Vec::new();
    for worker_id in 0..config.thumbnail_workers.max(1) {
        let store = store.clone();
        let config = config.clone();
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            info!(worker_id, "thumbnail worker starting");
            loop {
                tokio::select! {
                    result = store.dequeue_blocking(THUMBNAIL_QUEUE, Duration::from_secs(1)) => {
                        match result {
                            Ok(Some(payload)) => {
                                if let Err(err) = process_payload(&store, &config, &payload).await {
                                    warn!(worker_id, error = %err, "thumbnail: item processing failed");
                                }
                            }
                            Ok(None) => {}
                            Err(err) => {
                                warn!(worker_id, error = %err, "thumbnail: dequeue failed, backing off");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(worker_id, "thumbnail worker shutting down");
                            break;
                        }
                    }
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn process_payload(store: &StateStore, config: &Config, payload: &str) -> Result<()> {
    let event: FileEvent = match serde_json::from_str(payload) {
        Ok(e) => e,
        Err(err) => {
            warn!(error = %err, payload, "thumbnail: malformed event payload, dropping");
            return Ok(());
        }
    };

    if event.is_delete() {
        return remove_thumbnails(store, config, &event).await;
    }

    render_thumbnails(store, config, &event).await
}

async fn remove_thumbnails(store: &StateStore, config: &Config, event: &FileEvent) -> Result<()> {
    let key = thumbnail_key(&event.file_path);
    let stem = stem_of(&event.file_path);
    for (size, _, _) in SIZES {
        let path = output_path(&config.thumbnail_dir, size, &key, &stem);
        if let Err(err) = tokio::fs::remove_file(&path).await
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %err, "thumbnail: failed to remove file");
        }
    }
    store.del(&format!("thumbnails:{}", event.file_path)).await?;
    debug!(path = event.file_path, "thumbnail: cleaned up after delete");
    Ok(())
}

async fn render_thumbnails(store: &StateStore, config: &Config, event: &FileEvent) -> Result<()> {
    if !tokio::fs::try_exists(&event.container_path).await.unwrap_or(false) {
        debug!(path = event.file_path, "thumbnail: source file vanished, skipping");
        return Ok(());
    }

    let container_path = Path::new(&event.container_path);
    let file_type = mime::detect_file_type(container_path, &[]);
    let key = thumbnail_key(&event.file_path);
    let stem = stem_of(&event.file_path);

    let mut rendered = Vec::new();
    let mut all_unchanged = true;
    for (size, width, height) in SIZES {
        let output = output_path(&config.thumbnail_dir, size, &key, &stem);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            rendered.push((*size, output));
            continue;
        }
        all_unchanged = false;

        let result = match file_type {
            mime::FileType::Image => {
                image_render::render(container_path, &output, *width, *height, config.thumbnail_quality)
            }
            mime::FileType::Video => {
                video_render::render(container_path, &output, *width, *height, config.operation_timeout).await
            }
            _ => {
                debug!(path = event.file_path, "thumbnail: unsupported file type for rendering");
                continue;
            }
        };

        match result {
            Ok(()) => rendered.push((*size, output)),
            Err(err) => warn!(path = event.file_path, size, error = %err, "thumbnail render failed"),
        }
    }

    if all_unchanged {
        debug!(path = event.file_path, "thumbnail: all sizes already exist, unchanged");
    }

    if rendered.is_empty() {
        return Ok(());
    }

    let hash_key = format!("thumbnails:{}", event.file_path);
    for (size, path) in &rendered {
        store.hset(&hash_key, size, &path.to_string_lossy()).await?;
    }
    store.expire(&hash_key, config.thumbnail_hash_ttl).await?;
    Ok(())
}

fn output_path(root: &Path, size: &str, key: &str, stem: &str) -> PathBuf {
    root.join(size).join(format!("{key}_{stem}.jpg"))
}

fn stem_of(logical_path: &str) -> String {
    Path::new(logical_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}
