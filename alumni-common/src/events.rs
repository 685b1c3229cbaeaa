//! Event types and event bus for the alumni geo services
//!
//! Events are broadcast via [`EventBus`] and serialized for SSE
//! transmission to the admin UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Geocoding run events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoEvent {
    /// Run accepted and entering RUNNING
    ///
    /// Triggers:
    /// - SSE: Show progress UI
    GeocodeRunStarted {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// One more address processed (resolved or not)
    ///
    /// Triggers:
    /// - SSE: Update "X of Y processed"
    GeocodeProgress {
        run_id: Uuid,
        done: usize,
        total: usize,
        /// Progress percentage (0.0-100.0)
        percentage: f32,
        timestamp: DateTime<Utc>,
    },

    /// All results of one batch written back
    GeocodeBatchPersisted {
        run_id: Uuid,
        /// Zero-based batch index
        batch_index: usize,
        /// Rows updated in this batch
        written: usize,
        /// Rows whose update failed in this batch
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Run finished normally
    GeocodeRunCompleted {
        run_id: Uuid,
        candidates: usize,
        resolved: usize,
        written: usize,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run aborted by a fatal error
    ///
    /// Triggers:
    /// - SSE: Show error notification
    GeocodeRunFailed {
        run_id: Uuid,
        error_message: String,
        done: usize,
        timestamp: DateTime<Utc>,
    },

    /// Run stopped on administrator request
    GeocodeRunCancelled {
        run_id: Uuid,
        done: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
}

impl GeoEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            GeoEvent::GeocodeRunStarted { .. } => "GeocodeRunStarted",
            GeoEvent::GeocodeProgress { .. } => "GeocodeProgress",
            GeoEvent::GeocodeBatchPersisted { .. } => "GeocodeBatchPersisted",
            GeoEvent::GeocodeRunCompleted { .. } => "GeocodeRunCompleted",
            GeoEvent::GeocodeRunFailed { .. } => "GeocodeRunFailed",
            GeoEvent::GeocodeRunCancelled { .. } => "GeocodeRunCancelled",
        }
    }

    /// Run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            GeoEvent::GeocodeRunStarted { run_id, .. }
            | GeoEvent::GeocodeProgress { run_id, .. }
            | GeoEvent::GeocodeBatchPersisted { run_id, .. }
            | GeoEvent::GeocodeRunCompleted { run_id, .. }
            | GeoEvent::GeocodeRunFailed { run_id, .. }
            | GeoEvent::GeocodeRunCancelled { run_id, .. } => *run_id,
        }
    }

    /// True for the last event a run emits
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GeoEvent::GeocodeRunCompleted { .. }
                | GeoEvent::GeocodeRunFailed { .. }
                | GeoEvent::GeocodeRunCancelled { .. }
        )
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use alumni_common::events::{EventBus, GeoEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(GeoEvent::GeocodeRunStarted {
///     run_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GeoEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GeoEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: GeoEvent) -> Result<usize, broadcast::error::SendError<GeoEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GeoEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
