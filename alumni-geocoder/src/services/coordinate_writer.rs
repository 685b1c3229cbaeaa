//! Writes resolved coordinates back to alumni profiles

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use alumni_common::Result;

use crate::models::GeocodeResult;
use crate::types::ProfileStore;

/// Per-batch write counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Rows updated
    pub written: usize,
    /// Results without coordinates
    pub skipped: usize,
    /// Updates that returned an error
    pub failed: usize,
}

pub struct CoordinateWriter {
    store: Arc<dyn ProfileStore>,
}

impl CoordinateWriter {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Persist one result
    ///
    /// Returns `Ok(false)` for an unresolved result, which is never written.
    pub async fn write(&self, result: &GeocodeResult) -> Result<bool> {
        let Some(coordinates) = result.coordinates else {
            return Ok(false);
        };

        self.store
            .update_coordinates(&result.user_id, coordinates, Utc::now())
            .await?;
        Ok(true)
    }

    /// Persist every result independently
    ///
    /// A failed update is logged and counted; the remaining results are
    /// still written.
    pub async fn write_all(&self, results: &[GeocodeResult]) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();

        for result in results {
            match self.write(result).await {
                Ok(true) => outcome.written += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = %result.user_id,
                        error = %e,
                        "Failed to write coordinates"
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}
