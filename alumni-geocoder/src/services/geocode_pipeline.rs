//! Geocoding pipeline
//!
//! Collect → (resolve batch → persist batch)* → summary
//!
//! Each batch is fully persisted before the next one is resolved. Rows
//! already written stay written whatever the outcome of the run.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use alumni_common::events::{EventBus, GeoEvent};

use crate::models::{AddressQuery, GeocodeRun, Progress, RunState, RunSummary};
use crate::services::{
    AddressCollector, CoordinateWriter, ProgressReporter, RateLimitedGeocoder, RetryPolicy,
};
use crate::types::{Geocoder, ProfileStore};

/// Failures that end a run in FAILED
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(#[source] alumni_common::Error),

    #[error("Failed to collect geocoding candidates: {0}")]
    Collection(#[source] alumni_common::Error),
}

pub struct GeocodePipeline {
    store: Arc<dyn ProfileStore>,
    geocoder: Arc<dyn Geocoder>,
    event_bus: EventBus,
}

impl GeocodePipeline {
    pub fn new(store: Arc<dyn ProfileStore>, geocoder: Arc<dyn Geocoder>, event_bus: EventBus) -> Self {
        Self {
            store,
            geocoder,
            event_bus,
        }
    }

    /// Drive `run` to a terminal state and return it
    ///
    /// The returned run is COMPLETED, CANCELLED or FAILED. Persisting the run
    /// record is left to the caller.
    pub async fn execute(
        &self,
        mut run: GeocodeRun,
        reporter: &dyn ProgressReporter,
        cancel: CancellationToken,
    ) -> GeocodeRun {
        let run_id = run.run_id;
        run.transition_to(RunState::Running);
        info!(run_id = %run_id, parameters = ?run.parameters, "Geocoding run started");
        self.event_bus.emit_lossy(GeoEvent::GeocodeRunStarted {
            run_id,
            timestamp: chrono::Utc::now(),
        });

        let queries = match self.collect(&run).await {
            Ok(queries) => queries,
            Err(e) => {
                self.fail_run(&mut run, e);
                return run;
            }
        };

        let mut summary = RunSummary {
            candidates: queries.len(),
            ..Default::default()
        };
        let mut progress = Progress::new(0, queries.len());
        run.update_progress(progress);

        let resolver = RateLimitedGeocoder::new(
            self.geocoder.clone(),
            run.parameters.delay(),
            RetryPolicy::new(run.parameters.max_retries),
        );
        let writer = CoordinateWriter::new(self.store.clone());

        for (batch_index, batch) in queries.chunks(run.parameters.batch_size).enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let results = resolver.resolve(batch, &mut progress, reporter, &cancel).await;
            let resolved = results.iter().filter(|r| r.is_resolved()).count();
            summary.resolved += resolved;
            summary.unresolved += results.len() - resolved;

            let outcome = writer.write_all(&results).await;
            summary.written += outcome.written;
            summary.write_failures += outcome.failed;
            summary.batches += 1;

            info!(
                run_id = %run_id,
                batch_index,
                processed = results.len(),
                written = outcome.written,
                failed = outcome.failed,
                "Batch persisted"
            );
            self.event_bus.emit_lossy(GeoEvent::GeocodeBatchPersisted {
                run_id,
                batch_index,
                written: outcome.written,
                failed: outcome.failed,
                timestamp: chrono::Utc::now(),
            });
        }

        run.update_progress(progress);
        run.summary = Some(summary.clone());

        if cancel.is_cancelled() && progress.done < progress.total {
            run.transition_to(RunState::Cancelled);
            info!(
                run_id = %run_id,
                done = progress.done,
                total = progress.total,
                written = summary.written,
                "Geocoding run cancelled"
            );
            self.event_bus.emit_lossy(GeoEvent::GeocodeRunCancelled {
                run_id,
                done: progress.done,
                total: progress.total,
                timestamp: chrono::Utc::now(),
            });
            return run;
        }

        run.transition_to(RunState::Completed);
        let duration_seconds = run.elapsed_seconds();
        info!(
            run_id = %run_id,
            candidates = summary.candidates,
            resolved = summary.resolved,
            written = summary.written,
            duration_seconds,
            "Geocoding run completed"
        );
        self.event_bus.emit_lossy(GeoEvent::GeocodeRunCompleted {
            run_id,
            candidates: summary.candidates,
            resolved: summary.resolved,
            written: summary.written,
            duration_seconds,
            timestamp: chrono::Utc::now(),
        });

        run
    }

    async fn collect(&self, run: &GeocodeRun) -> Result<Vec<AddressQuery>, PipelineError> {
        run.parameters
            .validate()
            .map_err(PipelineError::InvalidParameters)?;

        AddressCollector::new(self.store.clone())
            .collect(run.parameters.page_size)
            .await
            .map_err(PipelineError::Collection)
    }

    fn fail_run(&self, run: &mut GeocodeRun, error: PipelineError) {
        let message = error.to_string();
        warn!(run_id = %run.run_id, error = %message, "Geocoding run failed");
        run.fail(message.clone());
        self.event_bus.emit_lossy(GeoEvent::GeocodeRunFailed {
            run_id: run.run_id,
            error_message: message,
            done: run.progress.done,
            timestamp: chrono::Utc::now(),
        });
    }
}
