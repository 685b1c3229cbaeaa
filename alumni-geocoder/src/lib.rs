//! alumni-geocoder library interface
//!
//! Exposes the pipeline components and the HTTP router for integration
//! testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use alumni_common::events::EventBus;

use crate::config::GeocoderSettings;
use crate::types::Geocoder;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub settings: Arc<GeocoderSettings>,
    /// Client shared by all runs
    pub geocoder: Arc<dyn Geocoder>,
    /// Cancellation tokens of active runs
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Background tasks of runs started by this process
    pub run_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last run failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        settings: GeocoderSettings,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        Self {
            db,
            event_bus,
            settings: Arc::new(settings),
            geocoder,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            run_tasks: Arc::new(Mutex::new(Vec::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Cancel every active run and wait until each has persisted its final state
    pub async fn shutdown_runs(&self) {
        for token in self.cancellation_tokens.read().await.values() {
            token.cancel();
        }

        let tasks: Vec<JoinHandle<()>> = self.run_tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Geocoding run task ended abnormally");
            }
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::geocode_routes())
        .route("/geocode/events", get(api::geocode_event_stream))
        .merge(api::profile_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
