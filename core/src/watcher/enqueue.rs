//! The five-stage enqueue deduplication discipline.
//!
//! Every debounced notification and every rescan hit funnels through
//! [`try_enqueue`] before it reaches `file_processing_queue`. The stages run
//! in strict order and each one can drop the path silently; only a path that
//! clears all five is written to the queue.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::event::{EventType, FileEvent};
use crate::hashing::{self, document_id};
use crate::path_normalizer::{self, LogicalPath};
use crate::state_store::StateStore;
use crate::volume::Volume;

const GLOBAL_LOCK_KEY_PREFIX: &str = "global_processing:";
const QUEUE_LOCK_KEY_PREFIX: &str = "queue_lock:";
const PROCESSED_MARKER_PREFIX: &str = "processed:";
const FILE_HASH_PREFIX: &str = "file_hash:";
const QUEUED_FILES_SET: &str = "queued_files";
const PROCESSED_FILES_SET: &str = "processed_files";
const WORK_QUEUE: &str = "file_processing_queue";

pub struct EnqueueOutcome {
    pub enqueued: bool,
}

/// Runs the full discipline for one raw notification. `container_path` must
/// still point at a real volume-relative path; existence checks for
/// non-delete events have already happened in the debounce stage.
pub async fn try_enqueue(
    store: &StateStore,
    volumes: &[Volume],
    container_path: &Path,
    event_type: EventType,
    global_lock_ttl: Duration,
    queue_lock_ttl: Duration,
    recency_window: Duration,
    file_hash_ttl: Duration,
) -> Result<EnqueueOutcome> {
    let logical = path_normalizer::normalize(volumes, container_path);

    let outcome = run_stages(
        store,
        container_path,
        &logical,
        event_type,
        global_lock_ttl,
        queue_lock_ttl,
        recency_window,
        file_hash_ttl,
    )
    .await;

    match outcome {
        Ok(result) => Ok(result),
        Err(err) => {
            // Any unexpected failure (not stage 2's deliberate early return)
            // releases both locks so a transient error doesn't orphan the
            // path for the full lock TTL.
            store.release_lock(&global_lock_key(&logical)).await.ok();
            store.release_lock(&queue_lock_key(&logical)).await.ok();
            Err(err)
        }
    }
}

async fn run_stages(
    store: &StateStore,
    container_path: &Path,
    logical: &LogicalPath,
    event_type: EventType,
    global_lock_ttl: Duration,
    queue_lock_ttl: Duration,
    recency_window: Duration,
    file_hash_ttl: Duration,
) -> Result<EnqueueOutcome> {
    let path = logical.as_str();

    // Stage 1: global lock.
    if !store
        .try_acquire_lock(&global_lock_key(logical), global_lock_ttl)
        .await?
    {
        debug!(path, "dropped: global lock already held");
        return Ok(EnqueueOutcome { enqueued: false });
    }

    // Stage 2: membership in queued_files. Deliberately does NOT release the
    // global lock just acquired above.
    if store.sismember(QUEUED_FILES_SET, path).await? {
        debug!(path, "dropped: already queued");
        return Ok(EnqueueOutcome { enqueued: false });
    }

    // Stage 3: recency check, created/modified only.
    if !matches!(event_type, EventType::Deleted)
        && let Some(marker) = store.get(&processed_marker_key(logical)).await?
        && let Ok(processed_at) = marker.parse::<f64>()
        && is_recent(processed_at, recency_window)
    {
        debug!(path, "dropped: processed recently");
        store.release_lock(&global_lock_key(logical)).await?;
        return Ok(EnqueueOutcome { enqueued: false });
    }

    // Stage 4: content-address dedup, created/modified only.
    let mut content_hash = String::new();
    if !matches!(event_type, EventType::Deleted) {
        content_hash = hashing::content_hash(container_path).await?;
        let hash_key = format!("{FILE_HASH_PREFIX}{content_hash}");
        match store.get(&hash_key).await? {
            Some(owner) if owner != path => {
                debug!(path, owner, "dropped: content already indexed under another path");
                store.release_lock(&global_lock_key(logical)).await?;
                return Ok(EnqueueOutcome { enqueued: false });
            }
            _ => {
                store.setex(&hash_key, path, file_hash_ttl).await?;
            }
        }
    }

    // Stage 5: short queue lock.
    if !store
        .try_acquire_lock(&queue_lock_key(logical), queue_lock_ttl)
        .await?
    {
        debug!(path, "dropped: queue lock already held");
        store.release_lock(&global_lock_key(logical)).await?;
        return Ok(EnqueueOutcome { enqueued: false });
    }

    // Stage 6: build and push the message.
    let event = build_event(container_path, logical, event_type, &content_hash);
    let payload = serde_json::to_string(&event)?;
    store.enqueue(WORK_QUEUE, &payload).await?;
    if !matches!(event_type, EventType::Deleted) {
        store.sadd(QUEUED_FILES_SET, path).await?;
    }
    store.release_lock(&queue_lock_key(logical)).await?;

    debug!(path, ?event_type, "enqueued");
    Ok(EnqueueOutcome { enqueued: true })
}

/// Immediate, synchronous bookkeeping performed for `deleted` notifications
/// independently of (and prior to) the debounced delete event reaching the
/// queue, so a concurrent rescan can't rediscover the vanished path.
pub async fn handle_immediate_delete(store: &StateStore, logical: &LogicalPath) -> Result<()> {
    let path = logical.as_str();
    store.srem(PROCESSED_FILES_SET, path).await?;
    store.srem(QUEUED_FILES_SET, path).await?;
    Ok(())
}

pub fn document_id_for(logical: &LogicalPath) -> String {
    document_id(logical.as_bytes())
}

fn build_event(
    container_path: &Path,
    logical: &LogicalPath,
    event_type: EventType,
    content_hash: &str,
) -> FileEvent {
    let metadata = std::fs::metadata(container_path).ok();
    let file_name = container_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_extension = container_path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let directory_path = {
        let full = logical.as_str();
        match full.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => full[..idx].to_string(),
            None => String::new(),
        }
    };

    FileEvent {
        event_type,
        id: document_id_for(logical),
        file_path: logical.as_str().to_string(),
        container_path: container_path.to_string_lossy().into_owned(),
        file_name,
        file_extension,
        file_size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
        content_hash: content_hash.to_string(),
        created_date: metadata
            .as_ref()
            .and_then(|m| m.created().ok())
            .map(chrono::DateTime::<Utc>::from),
        modified_date: metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(chrono::DateTime::<Utc>::from),
        directory_path,
        directory_depth: logical.directory_depth(),
        queued_at: Utc::now(),
    }
}

fn is_recent(processed_at_epoch_secs: f64, window: Duration) -> bool {
    let now = Utc::now().timestamp() as f64;
    now - processed_at_epoch_secs < window.as_secs_f64()
}

fn global_lock_key(logical: &LogicalPath) -> String {
    format!("{GLOBAL_LOCK_KEY_PREFIX}{}", logical.as_str())
}

fn queue_lock_key(logical: &LogicalPath) -> String {
    format!("{QUEUE_LOCK_KEY_PREFIX}{}", logical.as_str())
}

fn processed_marker_key(logical: &LogicalPath) -> String {
    format!("{PROCESSED_MARKER_PREFIX}{}", logical.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_window_excludes_boundary_correctly() {
        let now = Utc::now().timestamp() as f64;
        assert!(is_recent(now - 10.0, Duration::from_secs(7200)));
        assert!(!is_recent(now - 7300.0, Duration::from_secs(7200)));
    }
}
