//! Data models for alumni-geocoder
//!
//! - Address value objects flowing through the pipeline
//! - Geocode results and progress counters
//! - Run state machine and parameters

pub mod address;
pub mod geocode;
pub mod geocode_run;
pub mod parameters;

pub use address::{AddressFields, AddressQuery};
pub use geocode::{Coordinates, GeocodeResult, LocatedProfile, Progress};
pub use geocode_run::{GeocodeRun, RunProgress, RunState, RunSummary, StateTransition};
pub use parameters::{GeocodeParameters, ParameterOverrides};
