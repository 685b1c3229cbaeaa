//! Pipeline components for alumni-geocoder

pub mod address_collector;
pub mod address_formatter;
pub mod coordinate_writer;
pub mod geocode_pipeline;
pub mod nominatim_client;
pub mod progress;
pub mod rate_limited_geocoder;

pub use address_collector::AddressCollector;
pub use address_formatter::format_address;
pub use coordinate_writer::{CoordinateWriter, WriteOutcome};
pub use geocode_pipeline::{GeocodePipeline, PipelineError};
pub use nominatim_client::NominatimClient;
pub use progress::{bridge_progress, ChannelReporter, NoopReporter, ProgressReporter};
pub use rate_limited_geocoder::{RateLimitedGeocoder, RateLimiter, RetryPolicy};
