//! Profile query endpoints
//!
//! GET /profiles/missing-coordinates, GET /profiles/located

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{db::profiles, error::ApiResult, models::LocatedProfile, AppState};

/// GET /profiles/missing-coordinates response
#[derive(Debug, Serialize, Deserialize)]
pub struct MissingCoordinatesResponse {
    /// Profiles a run would pick up
    pub count: usize,
}

/// GET /profiles/missing-coordinates
pub async fn missing_coordinates(
    State(state): State<AppState>,
) -> ApiResult<Json<MissingCoordinatesResponse>> {
    let count = profiles::count_missing_coordinates(&state.db).await?;
    Ok(Json(MissingCoordinatesResponse { count }))
}

/// GET /profiles/located
///
/// Map markers for every profile with coordinates.
pub async fn located_profiles(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LocatedProfile>>> {
    let markers = profiles::list_located(&state.db).await?;
    tracing::debug!(count = markers.len(), "Located profiles query");
    Ok(Json(markers))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profiles/missing-coordinates", get(missing_coordinates))
        .route("/profiles/located", get(located_profiles))
}
