//! Per-volume raw notification sources.
//!
//! Each configured volume gets exactly one source, chosen once at
//! registration by [`super::mount::is_network_mount`]: a native OS watch
//! (inotify/FSEvents/ReadDirectoryChangesW via `notify`) where available, or
//! a polling fallback for network mounts where native events are unreliable.
//! Both backends feed the same [`RawEvent`] channel; the dispatcher that
//! consumes it doesn't know or care which backend produced an event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::event::EventType;

/// A raw, pre-debounce notification for a single path.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub path: PathBuf,
    pub event_type: EventType,
}

/// How a volume's filesystem notifications are sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Native OS notification API, via `notify`.
    Native,
    /// Periodic directory-tree diffing, for mounts where native events are
    /// unsupported or unreliable (typically network filesystems).
    Polling,
}

impl Backend {
    pub fn select(container_root: &Path) -> Self {
        if super::mount::is_network_mount(container_root) {
            Backend::Polling
        } else {
            Backend::Native
        }
    }
}

/// Starts the chosen backend for one volume root, forwarding decomposed
/// `{created, modified, deleted}` events into `tx` until the task is
/// dropped/aborted.
pub fn spawn(root: PathBuf, backend: Backend, tx: mpsc::UnboundedSender<RawEvent>) {
    match backend {
        Backend::Native => spawn_native(root, tx),
        Backend::Polling => spawn_polling(root, tx, Duration::from_secs(30)),
    }
}

fn spawn_native(root: PathBuf, tx: mpsc::UnboundedSender<RawEvent>) {
    tokio::task::spawn_blocking(move || {
        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let mut watcher = match RecommendedWatcher::new(raw_tx, notify::Config::default()) {
            Ok(w) => w,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "failed to create native watcher");
                return;
            }
        };
        if let Err(err) = watcher.watch(&root, RecursiveMode::Recursive) {
            warn!(root = %root.display(), error = %err, "failed to start native watch");
            return;
        }
        debug!(root = %root.display(), "native watcher started");

        while let Ok(result) = raw_rx.recv() {
            match result {
                Ok(event) => dispatch_native_event(event, &tx),
                Err(err) => warn!(root = %root.display(), error = %err, "notification backend error"),
            }
        }
    });
}

fn dispatch_native_event(event: Event, tx: &mpsc::UnboundedSender<RawEvent>) {
    use notify::event::{ModifyKind, RenameMode};

    let send = |path: PathBuf, event_type: EventType| {
        let _ = tx.send(RawEvent { path, event_type });
    };

    match event.kind {
        EventKind::Create(_) => {
            for path in event.paths {
                send(path, EventType::Created);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            send(event.paths[0].clone(), EventType::Deleted);
            send(event.paths[1].clone(), EventType::Created);
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in event.paths {
                send(path, EventType::Deleted);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in event.paths {
                send(path, EventType::Created);
            }
        }
        EventKind::Modify(_) => {
            for path in event.paths {
                send(path, EventType::Modified);
            }
        }
        EventKind::Remove(_) => {
            for path in event.paths {
                send(path, EventType::Deleted);
            }
        }
        _ => {}
    }
}

/// Snapshot-diff polling backend. Walks the tree every `interval`, comparing
/// against the previous snapshot of `path -> modified time` to synthesize
/// created/modified/deleted raw events.
fn spawn_polling(root: PathBuf, tx: mpsc::UnboundedSender<RawEvent>, interval: Duration) {
    tokio::spawn(async move {
        let mut previous: HashMap<PathBuf, SystemTime> = snapshot(&root).await;
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it, we already have a baseline
        loop {
            ticker.tick().await;
            let current = snapshot(&root).await;

            for (path, mtime) in &current {
                match previous.get(path) {
                    None => {
                        let _ = tx.send(RawEvent {
                            path: path.clone(),
                            event_type: EventType::Created,
                        });
                    }
                    Some(prev_mtime) if prev_mtime != mtime => {
                        let _ = tx.send(RawEvent {
                            path: path.clone(),
                            event_type: EventType::Modified,
                        });
                    }
                    _ => {}
                }
            }
            for path in previous.keys() {
                if !current.contains_key(path) {
                    let _ = tx.send(RawEvent {
                        path: path.clone(),
                        event_type: EventType::Deleted,
                    });
                }
            }

            previous = current;
        }
    });
}

async fn snapshot(root: &Path) -> HashMap<PathBuf, SystemTime> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut map = HashMap::new();
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(metadata) = entry.metadata()
                && let Ok(mtime) = metadata.modified()
            {
                map.insert(entry.path().to_path_buf(), mtime);
            }
        }
        map
    })
    .await
    .unwrap_or_default()
}
