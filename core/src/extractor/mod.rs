//! Extractor worker: pulls events off `file_processing_queue`, enriches them
//! with type-specific metadata, and upserts/deletes the corresponding index
//! document.

pub mod audio;
pub mod document;
pub mod image;
pub mod mime;
pub mod video;

use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value as Json, json};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::event::FileEvent;
use crate::index_client::IndexClient;
use crate::state_store::StateStore;
use mime::FileType;

const WORK_QUEUE: &str = "file_processing_queue";
const QUEUED_FILES_SET: &str = "queued_files";
const PROCESSED_FILES_SET: &str = "processed_files";
const THUMBNAIL_QUEUE: &str = "thumbnail_generation_queue";

/// Starts `config.extractor_workers` concurrent loops, each blocking on
/// `file_processing_queue` with a 1s timeout, until `shutdown` fires. Workers
/// share the same state-store connection pool and index client; parallelism
/// across them is safe because every mutation to a given logical path is
/// guarded by that path's `global_processing` lock.
pub async fn run_workers(
    store: StateStore,
    index: IndexClient,
    config: Config,
    shutdown: watch::Receiver<bool>,
) {
    let mut handles = Vec::new();
    for worker_id in 0..config.extractor_workers.max(1) {
        let store = store.clone();
        let index = index.clone();
        let config = config.clone();
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            info!(worker_id, "extractor worker starting");
            loop {
                tokio::select! {
                    result = store.dequeue_blocking(WORK_QUEUE, Duration::from_secs(1)) => {
                        match result {
                            Ok(Some(payload)) => {
                                if let Err(err) = process_payload(&store, &index, &config, &payload).await {
                                    warn!(worker_id, error = %err, "extractor: item processing failed");
                                }
                            }
                            Ok(None) => {}
                            Err(err) => {
                                warn!(worker_id, error = %err, "extractor: dequeue failed, backing off");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(worker_id, "extractor worker shutting down");
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

async fn process_payload(
    store: &StateStore,
    index: &IndexClient,
    config: &Config,
    payload: &str,
) -> Result<()> {
    let event: FileEvent = match serde_json::from_str(payload) {
        Ok(e) => e,
        Err(err) => {
            warn!(error = %err, payload, "extractor: malformed event payload, dropping");
            return Ok(());
        }
    };

    process_event(store, index, config, event).await
}

async fn process_event(
    store: &StateStore,
    index: &IndexClient,
    config: &Config,
    event: FileEvent,
) -> Result<()> {
    let path = event.file_path.clone();

    if event.is_delete() {
        if let Err(err) = index.delete_by_query("file_path", &path).await {
            warn!(path, error = %err, "extractor: index delete failed");
        }
        if mime::is_thumbnailable(&event.file_extension)
            && let Ok(payload) = serde_json::to_string(&event)
            && let Err(err) = store.enqueue(THUMBNAIL_QUEUE, &payload).await
        {
            warn!(path, error = %err, "extractor: failed to enqueue thumbnail cleanup");
        }
        release_global_lock(store, &path).await;
        return Ok(());
    }

    if !tokio::fs::try_exists(&event.container_path).await.unwrap_or(false) {
        debug!(path, "extractor: file vanished mid-flight, treating as success");
        release_global_lock(store, &path).await;
        return Ok(());
    }

    let container_path = std::path::Path::new(&event.container_path);
    let head = read_head(container_path).await;
    let file_type = mime::detect_file_type(container_path, &head);

    let mut extracted = match file_type {
        FileType::Image => image::extract(container_path),
        FileType::Video => video::extract(container_path, config.operation_timeout).await,
        FileType::Audio => audio::extract(container_path),
        FileType::Document => document::extract(container_path, &event.file_extension).await,
        FileType::Archive | FileType::Other => Map::new(),
    };
    extracted.remove("format");

    let document = build_document(&event, file_type, extracted);

    match should_skip(index, &path, &document).await {
        Ok(true) => {
            debug!(path, "extractor: skip-if-unchanged, no write needed");
            finish_success(store, &event, config).await?;
            return Ok(());
        }
        Ok(false) => {}
        Err(err) => warn!(path, error = %err, "extractor: skip-if-unchanged query failed, writing anyway"),
    }

    match index.upsert(&document).await {
        Ok(()) => {
            finish_success(store, &event, config).await?;
        }
        Err(err) => {
            warn!(path, error = %err, "extractor: index upsert failed, dropping (rescan will recover)");
            release_global_lock(store, &path).await;
        }
    }
    Ok(())
}

async fn read_head(path: &std::path::Path) -> Vec<u8> {
    use tokio::io::AsyncReadExt;
    match tokio::fs::File::open(path).await {
        Ok(mut file) => {
            let mut buf = vec![0u8; 4096];
            match file.read(&mut buf).await {
                Ok(n) => {
                    buf.truncate(n);
                    buf
                }
                Err(_) => Vec::new(),
            }
        }
        Err(_) => Vec::new(),
    }
}

fn build_document(event: &FileEvent, file_type: FileType, extracted: Map<String, Json>) -> Json {
    let mut document = match serde_json::to_value(event) {
        Ok(Json::Object(map)) => map,
        _ => Map::new(),
    };
    document.remove("event_type");
    document.remove("queued_at");
    document.remove("container_path");

    // `id` is already present (carried on the event from enqueue time, where
    // it was computed over the logical path's raw bytes); re-insert it
    // explicitly so the field order/presence doesn't depend on serde_json's
    // struct-to-map conversion happening to keep it.
    document.insert("id".into(), json!(event.id));
    document.insert("file_type".into(), json!(file_type.as_str()));
    document.insert("processing_status".into(), json!("completed"));
    for (key, value) in extracted {
        document.insert(key, value);
    }

    Json::Object(document)
}

/// Skip-if-unchanged: queries the index for the current document at this
/// logical path and compares `content_hash`/`modified_date`/`file_size`.
/// More than one match is an invariant violation (§9 Open Question): logged,
/// then the write proceeds anyway rather than silently dropping it.
async fn should_skip(index: &IndexClient, logical_path: &str, candidate: &Json) -> Result<bool> {
    let query = format!("file_path:\"{}\"", escape_query(logical_path));
    let response = index
        .select(&[
            ("q", query.as_str()),
            ("fl", "content_hash,modified_date,file_size,id"),
            ("wt", "json"),
        ])
        .await?;

    let docs = response
        .get("response")
        .and_then(|r| r.get("docs"))
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default();

    if docs.is_empty() {
        return Ok(false);
    }
    if docs.len() > 1 {
        let ids: Vec<String> = docs
            .iter()
            .filter_map(|d| d.get("id").and_then(Json::as_str).map(str::to_string))
            .collect();
        warn!(logical_path, count = docs.len(), ?ids, "more than one index document for file_path, invariant violated");
        return Ok(false);
    }

    Ok(decide_skip(&docs[0], candidate))
}

/// The decision table itself, pulled out of [`should_skip`] as a pure
/// function so it can be tested without a live index: skip iff the stored
/// and candidate documents match on content_hash+file_size, or the
/// candidate is no newer than the stored document and file_size matches.
fn decide_skip(stored: &Json, candidate: &Json) -> bool {
    let same_content = stored.get("content_hash") == candidate.get("content_hash")
        && stored.get("file_size") == candidate.get("file_size");
    if same_content {
        return true;
    }

    let same_size = stored.get("file_size") == candidate.get("file_size");
    let not_newer = match (stored.get("modified_date"), candidate.get("modified_date")) {
        (Some(Json::String(stored_date)), Some(Json::String(candidate_date))) => {
            candidate_date <= stored_date
        }
        _ => false,
    };
    same_size && not_newer
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

async fn finish_success(store: &StateStore, event: &FileEvent, config: &Config) -> Result<()> {
    let path = &event.file_path;
    let now = Utc::now().timestamp() as f64;
    store
        .setex(&format!("processed:{path}"), &now.to_string(), config.processed_marker_ttl)
        .await?;
    store.sadd(PROCESSED_FILES_SET, path).await?;
    store.srem(QUEUED_FILES_SET, path).await?;

    if mime::is_thumbnailable(&event.file_extension) {
        let payload = serde_json::to_string(event)?;
        store.enqueue(THUMBNAIL_QUEUE, &payload).await?;
    }

    release_global_lock(store, path).await;
    Ok(())
}

async fn release_global_lock(store: &StateStore, logical_path: &str) {
    if let Err(err) = store.release_lock(&format!("global_processing:{logical_path}")).await {
        warn!(logical_path, error = %err, "failed to release global lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_hash_and_size_skips() {
        let stored = json!({"content_hash": "abc", "file_size": 100, "modified_date": "2026-01-01T00:00:00Z"});
        let candidate = json!({"content_hash": "abc", "file_size": 100, "modified_date": "2026-01-02T00:00:00Z"});
        assert!(decide_skip(&stored, &candidate), "matching content_hash+file_size must skip regardless of modified_date");
    }

    #[test]
    fn older_or_equal_modified_date_with_same_size_skips() {
        let stored = json!({"content_hash": "abc", "file_size": 100, "modified_date": "2026-01-02T00:00:00Z"});
        let candidate = json!({"content_hash": "xyz", "file_size": 100, "modified_date": "2026-01-02T00:00:00Z"});
        assert!(decide_skip(&stored, &candidate));

        let candidate_older = json!({"content_hash": "xyz", "file_size": 100, "modified_date": "2026-01-01T00:00:00Z"});
        assert!(decide_skip(&stored, &candidate_older));
    }

    #[test]
    fn newer_modified_date_does_not_skip() {
        let stored = json!({"content_hash": "abc", "file_size": 100, "modified_date": "2026-01-01T00:00:00Z"});
        let candidate = json!({"content_hash": "xyz", "file_size": 100, "modified_date": "2026-01-02T00:00:00Z"});
        assert!(!decide_skip(&stored, &candidate));
    }

    #[test]
    fn different_file_size_never_skips() {
        let stored = json!({"content_hash": "abc", "file_size": 100, "modified_date": "2026-01-01T00:00:00Z"});
        let candidate = json!({"content_hash": "abc", "file_size": 200, "modified_date": "2026-01-01T00:00:00Z"});
        assert!(!decide_skip(&stored, &candidate));
    }

    #[test]
    fn missing_modified_date_does_not_skip() {
        let stored = json!({"content_hash": "abc", "file_size": 100});
        let candidate = json!({"content_hash": "xyz", "file_size": 100});
        assert!(!decide_skip(&stored, &candidate));
    }
}
