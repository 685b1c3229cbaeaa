//! Geocoding run API handlers
//!
//! POST /geocode/start, GET /geocode/status/:run_id, POST /geocode/cancel/:run_id

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::{runs, SqliteProfileStore},
    error::{ApiError, ApiResult},
    models::{GeocodeRun, ParameterOverrides, RunProgress, RunState, RunSummary},
    services::{bridge_progress, ChannelReporter, GeocodePipeline},
    AppState,
};

/// POST /geocode/start request
///
/// The whole body is optional, as is every parameter field.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StartGeocodeRequest {
    #[serde(default)]
    pub parameters: ParameterOverrides,
}

/// POST /geocode/start response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartGeocodeResponse {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
}

/// GET /geocode/status response
#[derive(Debug, Serialize, Deserialize)]
pub struct GeocodeStatusResponse {
    pub run_id: Uuid,
    pub state: RunState,
    pub progress: RunProgress,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// POST /geocode/cancel response
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelGeocodeResponse {
    pub run_id: Uuid,
    /// RUNNING while the background task winds down, CANCELLED if it was
    /// already gone
    pub state: RunState,
    pub done: usize,
    pub total: usize,
    pub cancel_requested_at: DateTime<Utc>,
}

/// POST /geocode/start
///
/// Validates parameters, persists the run and spawns it in the background.
pub async fn start_geocode(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StartGeocodeResponse>> {
    let request: StartGeocodeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartGeocodeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Malformed request body: {}", e)))?
    };

    let parameters = request.parameters.apply_to(state.settings.defaults);
    parameters.validate()?;

    // Hold the token map while checking so two starts cannot both pass
    let mut tokens = state.cancellation_tokens.write().await;
    if !tokens.is_empty() || runs::has_running_run(&state.db).await? {
        return Err(ApiError::Conflict("Geocoding run already active".to_string()));
    }

    let mut run = GeocodeRun::new(parameters);
    run.transition_to(RunState::Running);
    runs::save_run(&state.db, &run).await?;

    let cancel = CancellationToken::new();
    tokens.insert(run.run_id, cancel.clone());
    drop(tokens);

    let response = StartGeocodeResponse {
        run_id: run.run_id,
        state: run.state,
        started_at: run.started_at,
    };

    tracing::info!(
        run_id = %run.run_id,
        parameters = ?run.parameters,
        "Geocoding run accepted and persisted"
    );

    let state_clone = state.clone();
    let task = tokio::spawn(async move {
        execute_geocode_run(state_clone, run, cancel).await;
    });

    let mut tasks = state.run_tasks.lock().await;
    tasks.retain(|task| !task.is_finished());
    tasks.push(task);
    drop(tasks);

    Ok(Json(response))
}

/// GET /geocode/status/:run_id
pub async fn get_geocode_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<GeocodeStatusResponse>> {
    let run = runs::load_run(&state.db, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Geocoding run not found: {}", run_id)))?;

    tracing::debug!(run_id = %run_id, state = ?run.state, "Status query");

    Ok(Json(GeocodeStatusResponse {
        run_id: run.run_id,
        state: run.state,
        progress: run.progress,
        summary: run.summary,
        error: run.error,
        started_at: run.started_at,
        ended_at: run.ended_at,
    }))
}

/// POST /geocode/cancel/:run_id
///
/// Signals the run's token. The background task stops before its next
/// request and persists what it already resolved.
pub async fn cancel_geocode(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<CancelGeocodeResponse>> {
    let mut run = runs::load_run(&state.db, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Geocoding run not found: {}", run_id)))?;

    if run.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Geocoding run already in terminal state: {:?}",
            run.state
        )));
    }

    let token = state.cancellation_tokens.read().await.get(&run_id).cloned();
    match token {
        Some(token) => {
            token.cancel();
            tracing::info!(run_id = %run_id, "Cancellation requested");
        }
        None => {
            // No task drives this run any more
            run.transition_to(RunState::Cancelled);
            runs::save_run(&state.db, &run).await?;
            tracing::warn!(run_id = %run_id, "Cancelled orphaned run record");
        }
    }

    Ok(Json(CancelGeocodeResponse {
        run_id,
        state: run.state,
        done: run.progress.done,
        total: run.progress.total,
        cancel_requested_at: Utc::now(),
    }))
}

/// Background task for one run
///
/// Progress flows reporter → channel → bridge → event bus and run record.
/// The final run is persisted whatever its outcome.
async fn execute_geocode_run(state: AppState, run: GeocodeRun, cancel: CancellationToken) {
    let run_id = run.run_id;
    tracing::info!(run_id = %run_id, "Background geocoding task started");

    let (reporter, progress_rx) = ChannelReporter::new();
    let bridge = tokio::spawn(bridge_progress(
        progress_rx,
        state.event_bus.clone(),
        state.db.clone(),
        run_id,
    ));

    let pipeline = GeocodePipeline::new(
        Arc::new(SqliteProfileStore::new(state.db.clone())),
        state.geocoder.clone(),
        state.event_bus.clone(),
    );
    let final_run = pipeline.execute(run, &reporter, cancel).await;

    // Let the bridge drain before the final save so counters end up final
    drop(reporter);
    if let Err(e) = bridge.await {
        tracing::warn!(run_id = %run_id, error = %e, "Progress bridge task failed");
    }

    // Release the slot first so a terminal record always means a free slot
    state.cancellation_tokens.write().await.remove(&run_id);

    if let Err(e) = runs::save_run(&state.db, &final_run).await {
        tracing::error!(
            run_id = %run_id,
            error = %e,
            "Failed to persist final run state"
        );
        *state.last_error.write().await = Some(format!("Run {}: {}", run_id, e));
    }

    if let Some(error) = &final_run.error {
        *state.last_error.write().await = Some(format!("Run {}: {}", run_id, error));
    }

    tracing::info!(
        run_id = %run_id,
        state = ?final_run.state,
        elapsed_seconds = final_run.elapsed_seconds(),
        "Background geocoding task finished"
    );
}

/// Build geocoding run routes
pub fn geocode_routes() -> Router<AppState> {
    Router::new()
        .route("/geocode/start", post(start_geocode))
        .route("/geocode/status/:run_id", get(get_geocode_status))
        .route("/geocode/cancel/:run_id", post(cancel_geocode))
}
