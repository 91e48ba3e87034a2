//! The work-queue message schema shared by the watcher and the extractor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Modified,
    Deleted,
}

impl EventType {
    /// `deleted` always wins over a pending `created`/`modified` for the
    /// same path when coalescing raw notifications.
    pub fn supersedes(self, other: EventType) -> bool {
        matches!(self, EventType::Deleted) || !matches!(other, EventType::Deleted)
    }
}

/// A message in `file_processing_queue`, JSON-encoded. Unknown fields must be
/// tolerated by consumers, so this is deserialized with `#[serde(default)]`
/// on every field that a future producer might omit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    pub event_type: EventType,
    /// `sha256_hex` of the logical path's raw bytes, computed once at
    /// enqueue time while the original (possibly non-UTF-8) path bytes are
    /// still available. Carried on the event so the extractor never has to
    /// recompute it from `file_path`, which is already lossy-decoded.
    pub id: String,
    pub file_path: String,
    pub container_path: String,
    pub file_name: String,
    pub file_extension: String,
    pub file_size: u64,
    pub content_hash: String,
    pub created_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub directory_path: String,
    pub directory_depth: usize,
    pub queued_at: DateTime<Utc>,
}

impl FileEvent {
    pub fn is_delete(&self) -> bool {
        matches!(self.event_type, EventType::Deleted)
    }
}
