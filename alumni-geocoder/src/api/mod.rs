//! HTTP API handlers for alumni-geocoder
//!
//! REST endpoints for run control and profile queries, SSE for progress

pub mod geocode;
pub mod health;
pub mod profiles;
pub mod sse;

pub use geocode::geocode_routes;
pub use health::health_routes;
pub use profiles::profile_routes;
pub use sse::geocode_event_stream;
