//! Geocoding results and progress counters

use serde::{Deserialize, Serialize};

/// A resolved latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Outcome of resolving one address
///
/// `coordinates` is `None` when the address could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub user_id: String,
    pub coordinates: Option<Coordinates>,
}

impl GeocodeResult {
    pub fn resolved(user_id: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            user_id: user_id.into(),
            coordinates: Some(coordinates),
        }
    }

    pub fn unresolved(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            coordinates: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.coordinates.is_some()
    }
}

/// `(done, total)` counter handed to progress reporters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(done: usize, total: usize) -> Self {
        Self { done, total }
    }

    /// Percentage complete (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total > 0 {
            (self.done as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Map marker for a profile that has coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocatedProfile {
    pub user_id: String,
    pub full_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}
