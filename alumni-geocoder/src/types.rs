//! Core trait definitions for alumni-geocoder
//!
//! The pipeline talks to its two external collaborators through these
//! seams:
//! - [`Geocoder`]: a single lookup against a geocoding web service
//! - [`ProfileStore`]: reads candidates from and writes coordinates to the
//!   alumni profile table
//!
//! Both are injected into the pipeline so tests can substitute fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{AddressFields, Coordinates};

/// Geocoding lookup errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl GeocodeError {
    /// Whether a later attempt may succeed
    ///
    /// Network failures, timeouts, 5xx and 429 are transient. Other 4xx
    /// responses and malformed bodies are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            GeocodeError::Network(_) | GeocodeError::Timeout => true,
            GeocodeError::Http { status, .. } => *status >= 500 || *status == 429,
            GeocodeError::Parse(_) => false,
        }
    }
}

/// One free-text address lookup requesting at most one match
///
/// `Ok(None)` means the service answered with an empty match list.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Alumni profile persistence used by the pipeline
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profiles without latitude and with a non-blank address, at most `page_size`
    async fn fetch_missing_coordinates(
        &self,
        page_size: usize,
    ) -> alumni_common::Result<Vec<AddressFields>>;

    /// Set latitude, longitude and update timestamp of one profile
    async fn update_coordinates(
        &self,
        user_id: &str,
        coordinates: Coordinates,
        updated_at: DateTime<Utc>,
    ) -> alumni_common::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GeocodeError::Network("reset".into()).is_transient());
        assert!(GeocodeError::Timeout.is_transient());
        assert!(GeocodeError::Http { status: 503, body: String::new() }.is_transient());
        assert!(GeocodeError::Http { status: 429, body: String::new() }.is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert!(!GeocodeError::Http { status: 400, body: String::new() }.is_transient());
        assert!(!GeocodeError::Http { status: 403, body: String::new() }.is_transient());
        assert!(!GeocodeError::Parse("bad json".into()).is_transient());
    }
}
