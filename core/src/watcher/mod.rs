//! Filesystem watcher + scanner: converts raw OS notifications and periodic
//! rescans into a deduplicated stream of events on `file_processing_queue`.
//!
//! The state machine is the one described in the design: `IDLE -> notify ->
//! DEBOUNCING -> timer -> ENQUEUING -> commit -> LOCKED`, with the debounce
//! stage implemented by [`debounce::Debouncer`] and the enqueue discipline by
//! [`enqueue::try_enqueue`]. This module is the dispatcher that wires a raw
//! notification channel (one producer per volume, from [`source`]) through
//! both stages and owns the startup/periodic rescan tasks.

pub mod debounce;
pub mod enqueue;
pub mod filter;
mod mount;
pub mod scanner;
pub mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::event::EventType;
use crate::path_normalizer::{self, LogicalPath};
use crate::state_store::StateStore;
use crate::volume::Volume;
use debounce::{Debouncer, Fired};
use source::{Backend, RawEvent};

/// Shared, immutable context handed to every debounce-fired task and the
/// rescan loop. Cheap to clone (an `Arc` body plus two small handles).
#[derive(Clone)]
struct Context {
    store: StateStore,
    volumes: Arc<Vec<Volume>>,
    global_lock_ttl: Duration,
    queue_lock_ttl: Duration,
    recency_window: Duration,
    file_hash_ttl: Duration,
}

pub struct Watcher {
    ctx: Context,
    debouncer: Debouncer,
    debounce_window: Duration,
    rescan_interval: Duration,
}

impl Watcher {
    pub fn new(store: StateStore, config: &Config) -> Self {
        let ctx = Context {
            store,
            volumes: Arc::new(config.volumes.clone()),
            global_lock_ttl: config.global_lock_ttl,
            queue_lock_ttl: config.queue_lock_ttl,
            recency_window: config.recency_window,
            file_hash_ttl: config.file_hash_ttl,
        };
        Self {
            ctx,
            debouncer: Debouncer::new(config.debounce_window),
            debounce_window: config.debounce_window,
            rescan_interval: config.rescan_interval,
        }
    }

    /// Runs the watcher until `shutdown` is signaled: starts one
    /// notification source per volume, the raw-event dispatcher, the startup
    /// scan, and the periodic rescan timer. Returns once every task has wound
    /// down (active debounce timers are cancelled; in-flight ones whose file
    /// no longer exists are dropped without enqueue).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<RawEvent>();

        for volume in self.ctx.volumes.iter() {
            let backend = Backend::select(&volume.container_root);
            info!(volume = %volume.name, ?backend, "registering volume notification source");
            source::spawn(volume.container_root.clone(), backend, raw_tx.clone());
        }
        drop(raw_tx);

        info!("startup scan beginning");
        if let Err(err) = scanner::scan_all(
            &self.ctx.store,
            &self.ctx.volumes,
            self.ctx.global_lock_ttl,
            self.ctx.queue_lock_ttl,
            self.ctx.recency_window,
            self.ctx.file_hash_ttl,
        )
        .await
        {
            warn!(error = %err, "startup scan failed");
        }

        let mut rescan_timer = tokio::time::interval(self.rescan_interval);
        rescan_timer.tick().await; // startup scan above already covers tick 0

        loop {
            tokio::select! {
                Some(raw) = raw_rx.recv() => {
                    self.handle_raw_event(raw);
                }
                _ = rescan_timer.tick() => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = scanner::scan_all(
                            &ctx.store,
                            &ctx.volumes,
                            ctx.global_lock_ttl,
                            ctx.queue_lock_ttl,
                            ctx.recency_window,
                            ctx.file_hash_ttl,
                        ).await {
                            warn!(error = %err, "periodic rescan failed");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("watcher shutting down, cancelling pending debounce timers");
                        self.debouncer.cancel_all().await;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_raw_event(&self, raw: RawEvent) {
        if filter::is_noise_path(&raw.path) || !filter::is_supported_extension(&raw.path) {
            return;
        }
        if matches!(raw.event_type, EventType::Deleted) {
            let ctx = self.ctx.clone();
            let path = raw.path.clone();
            tokio::spawn(async move {
                let logical = path_normalizer::normalize(&ctx.volumes, &path);
                if let Err(err) = enqueue::handle_immediate_delete(&ctx.store, &logical).await {
                    warn!(path = %logical, error = %err, "immediate delete bookkeeping failed");
                }
            });
        }

        let ctx = self.ctx.clone();
        self.debouncer.notify(raw.path, raw.event_type, move |path, fired| {
            let ctx = ctx.clone();
            async move {
                handle_fired(ctx, path, fired).await;
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn debounce_window(&self) -> Duration {
        self.debounce_window
    }
}

async fn handle_fired(ctx: Context, path: PathBuf, fired: Fired) {
    let event_type = match fired {
        Fired::Stale => {
            debug!(path = %path.display(), "debounce entry stale, dropping");
            return;
        }
        Fired::Proceed(event_type) => event_type,
    };

    if !matches!(event_type, EventType::Deleted) && !path_exists(&path) {
        debug!(path = %path.display(), "file vanished before debounce fired, dropping");
        return;
    }

    match enqueue::try_enqueue(
        &ctx.store,
        &ctx.volumes,
        &path,
        event_type,
        ctx.global_lock_ttl,
        ctx.queue_lock_ttl,
        ctx.recency_window,
        ctx.file_hash_ttl,
    )
    .await
    {
        Ok(outcome) => {
            if outcome.enqueued {
                debug!(path = %path.display(), ?event_type, "enqueued from debounce fire");
            }
        }
        Err(err) => warn!(path = %path.display(), error = %err, "enqueue discipline failed"),
    }
}

fn path_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

pub use mount::is_network_mount;

#[cfg(test)]
mod tests {
    use super::*;

    fn volumes() -> Vec<Volume> {
        vec![Volume::new("photos", "/nas/photos")]
    }

    #[test]
    fn logical_path_round_trips_through_normalizer() {
        let logical: LogicalPath = path_normalizer::normalize(&volumes(), Path::new("/nas/photos/a.jpg"));
        assert_eq!(logical.as_str(), "/photos/a.jpg");
    }
}
