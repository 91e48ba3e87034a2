//! Exercises the six-stage enqueue discipline end to end against a live
//! state store, the way `folder_monitor_test.rs` exercises the scanner
//! against a live database rather than a mock trait object.
//!
//! Requires a reachable Redis-compatible server; set `TEST_REDIS_URL` to
//! point elsewhere. Each test picks a fresh random key prefix via a
//! unique volume name so concurrent test runs don't collide.

use std::time::Duration;

use nas_indexer_core::event::EventType;
use nas_indexer_core::state_store::StateStore;
use nas_indexer_core::volume::Volume;
use nas_indexer_core::watcher::enqueue::try_enqueue;
use tempfile::TempDir;
use uuid::Uuid;

const GLOBAL_LOCK_TTL: Duration = Duration::from_secs(300);
const QUEUE_LOCK_TTL: Duration = Duration::from_secs(5);
const RECENCY_WINDOW: Duration = Duration::from_secs(3600);
const FILE_HASH_TTL: Duration = Duration::from_secs(86400);

async fn connect() -> StateStore {
    let url = std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    StateStore::connect(&url)
        .await
        .expect("failed to connect to test Redis instance")
}

fn unique_volume(temp_dir: &TempDir) -> Volume {
    let name = format!("testvol-{}", Uuid::new_v4());
    Volume::new(name, temp_dir.path())
}

async fn enqueue(
    store: &StateStore,
    volumes: &[Volume],
    path: &std::path::Path,
    event_type: EventType,
) -> bool {
    try_enqueue(
        store,
        volumes,
        path,
        event_type,
        GLOBAL_LOCK_TTL,
        QUEUE_LOCK_TTL,
        RECENCY_WINDOW,
        FILE_HASH_TTL,
    )
    .await
    .expect("try_enqueue failed")
    .enqueued
}

#[tokio::test]
async fn first_sighting_of_a_file_is_enqueued() {
    let store = connect().await;
    let temp_dir = TempDir::new().unwrap();
    let volume = unique_volume(&temp_dir);
    let file_path = temp_dir.path().join("photo.jpg");
    std::fs::write(&file_path, b"fake jpeg bytes").unwrap();

    let outcome = enqueue(&store, &[volume], &file_path, EventType::Created).await;
    assert!(outcome, "a never-before-seen file should be enqueued");
}

#[tokio::test]
async fn already_queued_path_is_dropped_by_stage_two() {
    let store = connect().await;
    let temp_dir = TempDir::new().unwrap();
    let volume = unique_volume(&temp_dir);
    let file_path = temp_dir.path().join("document.pdf");
    std::fs::write(&file_path, b"fake pdf bytes").unwrap();

    let first = enqueue(&store, &[volume.clone()], &file_path, EventType::Created).await;
    assert!(first, "first notification should enqueue");

    // The global lock from the first pass is still held, so a second
    // notification for the same path is dropped at stage 1 before stage 2
    // is even reached - this is the behaviour under test either way.
    let second = enqueue(&store, &[volume], &file_path, EventType::Modified).await;
    assert!(!second, "a path already queued must not be enqueued twice");
}

#[tokio::test]
async fn identical_content_under_two_paths_is_deduplicated() {
    let store = connect().await;
    let temp_dir = TempDir::new().unwrap();
    let volume = unique_volume(&temp_dir);

    let original = temp_dir.path().join("original.txt");
    let duplicate = temp_dir.path().join("duplicate.txt");
    std::fs::write(&original, b"identical payload").unwrap();
    std::fs::write(&duplicate, b"identical payload").unwrap();

    let first = enqueue(&store, &[volume.clone()], &original, EventType::Created).await;
    assert!(first, "the first copy should be enqueued and claim the content hash");

    // Release the global lock the first call took, as a rescan's follow-up
    // notification for a different path would arrive well outside the lock
    // window in practice; here we release explicitly to isolate stage 4.
    let normalized = nas_indexer_core::path_normalizer::normalize(&[volume.clone()], &original);
    store
        .release_lock(&format!("global_processing:{}", normalized.as_str()))
        .await
        .unwrap();

    let second = enqueue(&store, &[volume], &duplicate, EventType::Created).await;
    assert!(
        !second,
        "a second path with identical content must be dropped by the content-hash stage"
    );
}

#[tokio::test]
async fn deleted_event_skips_recency_and_content_hash_stages() {
    let store = connect().await;
    let temp_dir = TempDir::new().unwrap();
    let volume = unique_volume(&temp_dir);
    let file_path = temp_dir.path().join("removed.mp4");

    // The file never needs to exist on disk for a delete notification - the
    // discipline must not stat it for stages 3/4, which are gated on
    // non-delete event types.
    let outcome = enqueue(&store, &[volume], &file_path, EventType::Deleted).await;
    assert!(outcome, "a delete notification should clear every stage without touching the filesystem");
}
