//! Nominatim search API client
//!
//! One lookup per call, no pacing of its own. Spacing and retries are the
//! job of [`RateLimitedGeocoder`](super::RateLimitedGeocoder).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::models::Coordinates;
use crate::types::{GeocodeError, Geocoder};

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str = "alumni-geocoder/0.1.0 (alumni portal map)";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// One element of the search response array
///
/// Nominatim returns coordinates as decimal strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim search client
pub struct NominatimClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl NominatimClient {
    pub fn new(
        endpoint: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        tracing::debug!(query = %query, endpoint = %self.endpoint, "Querying Nominatim");

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(map_request_error)?;
        parse_search_response(&body)
    }
}

fn map_request_error(err: reqwest::Error) -> GeocodeError {
    if err.is_timeout() {
        GeocodeError::Timeout
    } else {
        GeocodeError::Network(err.to_string())
    }
}

/// First match of a search response, `None` for an empty array
pub fn parse_search_response(body: &str) -> Result<Option<Coordinates>, GeocodeError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| GeocodeError::Parse(e.to_string()))?;

    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };

    let latitude = place
        .lat
        .trim()
        .parse::<f64>()
        .map_err(|e| GeocodeError::Parse(format!("Invalid lat '{}': {}", place.lat, e)))?;
    let longitude = place
        .lon
        .trim()
        .parse::<f64>()
        .map_err(|e| GeocodeError::Parse(format!("Invalid lon '{}': {}", place.lon, e)))?;

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(GeocodeError::Parse(format!(
            "Coordinates out of range: lat {}, lon {}",
            place.lat, place.lon
        )));
    }

    Ok(Some(Coordinates::new(latitude, longitude)))
}
