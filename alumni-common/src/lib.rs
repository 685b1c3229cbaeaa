//! # Alumni Geo Common Library
//!
//! Shared code for the alumni portal geo services including:
//! - Error and result types
//! - TOML configuration loading and root folder resolution
//! - Event types (GeoEvent enum) and the broadcast EventBus
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
