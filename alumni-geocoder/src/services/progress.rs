//! Progress reporting
//!
//! The resolver reports synchronously after every address. Reporters either
//! run a closure or forward into a channel that [`bridge_progress`] drains
//! into the event bus and the run record.

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;
use alumni_common::events::{EventBus, GeoEvent};

use crate::db::runs;
use crate::models::Progress;

/// Receives `{done, total}` after each processed address
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: Progress);
}

impl<F> ProgressReporter for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Reporter that discards everything
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _progress: Progress) {}
}

/// Reporter forwarding into an unbounded mpsc channel
///
/// Sending never blocks the resolver. Reports after the receiver is dropped
/// are discarded.
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<Progress>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Progress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, progress: Progress) {
        if self.tx.send(progress).is_err() {
            debug!("Progress receiver dropped, report discarded");
        }
    }
}

/// Drain progress reports into `GeocodeProgress` events and the run record
///
/// Every report becomes an event. Only the newest report of each burst is
/// written to the database. Runs until every [`ChannelReporter`] for `rx`
/// is dropped.
pub async fn bridge_progress(
    mut rx: mpsc::UnboundedReceiver<Progress>,
    event_bus: EventBus,
    pool: SqlitePool,
    run_id: Uuid,
) {
    debug!(run_id = %run_id, "Progress bridge started");

    while let Some(mut latest) = rx.recv().await {
        emit_progress(&event_bus, run_id, latest);

        while let Ok(next) = rx.try_recv() {
            emit_progress(&event_bus, run_id, next);
            latest = next;
        }

        if let Err(e) = runs::update_progress(&pool, run_id, latest.done, latest.total).await {
            warn!(run_id = %run_id, error = %e, "Failed to persist run progress");
        }
    }

    debug!(run_id = %run_id, "Progress bridge stopped");
}

fn emit_progress(event_bus: &EventBus, run_id: Uuid, progress: Progress) {
    event_bus.emit_lossy(GeoEvent::GeocodeProgress {
        run_id,
        done: progress.done,
        total: progress.total,
        percentage: progress.percentage() as f32,
        timestamp: chrono::Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeocodeParameters, GeocodeRun, RunState};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Mutex;

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = |p: Progress| seen.lock().unwrap().push(p.done);
        reporter.report(Progress::new(1, 2));
        reporter.report(Progress::new(2, 2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_channel_reporter_forwards() {
        let (reporter, mut rx) = ChannelReporter::new();
        reporter.report(Progress::new(1, 3));
        assert_eq!(rx.recv().await, Some(Progress::new(1, 3)));

        drop(rx);
        // Must not panic once the receiver is gone
        reporter.report(Progress::new(2, 3));
    }

    #[tokio::test]
    async fn test_bridge_emits_events_and_persists_latest() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();

        let mut run = GeocodeRun::new(GeocodeParameters::default());
        run.transition_to(RunState::Running);
        runs::save_run(&pool, &run).await.unwrap();

        let event_bus = EventBus::new(16);
        let mut events = event_bus.subscribe();

        let (reporter, rx) = ChannelReporter::new();
        let bridge = tokio::spawn(bridge_progress(rx, event_bus.clone(), pool.clone(), run.run_id));

        for done in 1..=3 {
            reporter.report(Progress::new(done, 3));
        }
        drop(reporter);
        bridge.await.unwrap();

        for expected in 1..=3 {
            match events.recv().await.unwrap() {
                GeoEvent::GeocodeProgress { done, total, .. } => {
                    assert_eq!((done, total), (expected, 3));
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        let stored = runs::load_run(&pool, run.run_id).await.unwrap().unwrap();
        assert_eq!((stored.progress.done, stored.progress.total), (3, 3));
    }
}
