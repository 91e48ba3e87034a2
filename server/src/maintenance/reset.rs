//! State-reset maintenance subcommand.
//!
//! Clears the processing/dedup bookkeeping that the watcher and extractor
//! maintain in the state store, so a subsequent rescan re-extracts metadata
//! and re-indexes every file from scratch. Thumbnails are left untouched:
//! they remain valid across a reset as long as their source files are still
//! on disk, so there's no reason to pay for re-rendering them.

use anyhow::Result;
use nas_indexer_core::state_store::StateStore;
use tracing::warn;

const SCALAR_SET_KEYS: &[&str] = &["processed_files", "queued_files"];
const PATTERN_KEYS: &[&str] = &["processed:*", "file_hash:*", "global_processing:*", "queue_lock:*"];

pub struct ResetReport {
    pub cleared: Vec<(String, usize)>,
}

pub async fn run(store: &StateStore, execute: bool) -> Result<ResetReport> {
    let mut cleared = Vec::new();

    for key in SCALAR_SET_KEYS {
        let count = store.scard(key).await.unwrap_or(0) as usize;
        if execute && count > 0 {
            if let Err(err) = store.del(key).await {
                warn!(key, error = %err, "reset: failed to delete key");
            }
        }
        cleared.push((key.to_string(), count));
    }

    for pattern in PATTERN_KEYS {
        let keys = store.scan(pattern).await.unwrap_or_default();
        let count = keys.len();
        if execute {
            for key in &keys {
                if let Err(err) = store.del(key).await {
                    warn!(key, error = %err, "reset: failed to delete key");
                }
            }
        }
        cleared.push((pattern.to_string(), count));
    }

    Ok(ResetReport { cleared })
}

pub fn print_report(report: &ResetReport, execute: bool) {
    if execute {
        println!("state reset: cleared the following keys");
    } else {
        println!("state reset (dry run): the following keys would be cleared. Pass --execute to commit.");
    }
    for (kind, count) in &report.cleared {
        println!("  {kind}: {count}");
    }
    println!("thumbnails:* left untouched");
}
