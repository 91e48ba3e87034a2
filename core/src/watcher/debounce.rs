//! Per-path debounce state machine.
//!
//! One entry per path currently pending a decision. A generation counter
//! lets an in-flight timer recognize it has been superseded by a later
//! notification without needing to cancel a spawned task outright.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use crate::event::EventType;

struct PendingEntry {
    event_type: EventType,
    armed_at: Instant,
    generation: u64,
}

#[derive(Clone)]
pub struct Debouncer {
    pending: Arc<Mutex<HashMap<PathBuf, PendingEntry>>>,
    window: Duration,
}

/// What a fired timer should do once it wins the generation race.
pub enum Fired {
    Stale,
    Proceed(EventType),
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Registers a raw notification and spawns the timer task that will
    /// eventually call `on_fire` with the outcome. `modified` events wait an
    /// extra second before arming, to let writes settle.
    pub fn notify<F, Fut>(&self, path: PathBuf, event_type: EventType, on_fire: F)
    where
        F: FnOnce(PathBuf, Fired) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let debouncer = self.clone();
        tokio::spawn(async move {
            if matches!(event_type, EventType::Modified) {
                sleep(Duration::from_secs(1)).await;
            }
            let generation = debouncer.arm(path.clone(), event_type).await;
            sleep(debouncer.window).await;
            let fired = debouncer.fire(&path, generation).await;
            on_fire(path, fired).await;
        });
    }

    /// Overwrites (or creates) the pending entry, last-writer-wins on
    /// event type except that `deleted` always beats a pending
    /// `created`/`modified`. Returns the generation the caller's timer
    /// should check against when it fires.
    async fn arm(&self, path: PathBuf, event_type: EventType) -> u64 {
        let mut pending = self.pending.lock().await;
        let (generation, event_type) = match pending.get(&path) {
            Some(existing) if !event_type.supersedes(existing.event_type) => {
                debug!(path = %path.display(), "pending event not superseded, keeping existing");
                (existing.generation + 1, existing.event_type)
            }
            Some(existing) => (existing.generation + 1, event_type),
            None => (0, event_type),
        };
        pending.insert(
            path,
            PendingEntry {
                event_type,
                armed_at: Instant::now(),
                generation,
            },
        );
        generation
    }

    async fn fire(&self, path: &PathBuf, generation: u64) -> Fired {
        let mut pending = self.pending.lock().await;
        match pending.get(path) {
            Some(entry) if entry.generation == generation => {
                let stale = entry.armed_at.elapsed() > self.window * 2;
                let event_type = entry.event_type;
                pending.remove(path);
                if stale {
                    Fired::Stale
                } else {
                    Fired::Proceed(event_type)
                }
            }
            _ => Fired::Stale,
        }
    }

    pub async fn cancel_all(&self) {
        self.pending.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_notification_before_fire_supersedes_the_first() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let path = PathBuf::from("/m/photos/a.jpg");

        let gen1 = debouncer.arm(path.clone(), EventType::Created).await;
        let gen2 = debouncer.arm(path.clone(), EventType::Modified).await;
        assert!(gen2 > gen1, "a later notification must bump the generation");

        // The stale (gen1) timer loses the race and reports Stale even
        // though its window hasn't technically elapsed.
        match debouncer.fire(&path, gen1).await {
            Fired::Stale => {}
            Fired::Proceed(_) => panic!("a superseded generation must not proceed"),
        }
    }

    #[tokio::test]
    async fn deleted_always_wins_over_pending_create_or_modify() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let path = PathBuf::from("/m/photos/a.jpg");

        debouncer.arm(path.clone(), EventType::Created).await;
        let gen = debouncer.arm(path.clone(), EventType::Deleted).await;
        match debouncer.fire(&path, gen).await {
            Fired::Proceed(EventType::Deleted) => {}
            _ => panic!("a delete notification must win over the pending create"),
        }
    }

    #[tokio::test]
    async fn later_create_does_not_clobber_a_pending_delete() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let path = PathBuf::from("/m/photos/a.jpg");

        debouncer.arm(path.clone(), EventType::Deleted).await;
        let gen = debouncer.arm(path.clone(), EventType::Created).await;
        match debouncer.fire(&path, gen).await {
            Fired::Proceed(EventType::Deleted) => {}
            _ => panic!("a create arriving after a pending delete must not overwrite it"),
        }
    }

    #[tokio::test]
    async fn a_timer_older_than_twice_the_window_fires_stale() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let path = PathBuf::from("/m/photos/a.jpg");

        let gen = debouncer.arm(path.clone(), EventType::Created).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        match debouncer.fire(&path, gen).await {
            Fired::Stale => {}
            Fired::Proceed(_) => panic!("an entry older than 2x the window must be dropped as stale"),
        }
    }
}
