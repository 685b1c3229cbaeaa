//! Geocoding run parameters

use alumni_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Upper bound on candidates read per run
pub const MAX_PAGE_SIZE: usize = 100_000;

/// Public Nominatim usage policy: at most one request per second
pub const POLITE_DELAY_MS: u64 = 1000;

/// Parameters of one geocoding run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodeParameters {
    /// Minimum spacing between two geocoding requests
    pub delay_ms: u64,
    /// Addresses resolved before their results are persisted
    pub batch_size: usize,
    /// Maximum number of candidate profiles read per run
    pub page_size: usize,
    /// Retries for transient failures (0 = single attempt)
    pub max_retries: u32,
}

impl Default for GeocodeParameters {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DELAY_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl GeocodeParameters {
    pub fn delay(&self) -> Duration {
        alumni_common::time::millis_to_duration(self.delay_ms)
    }

    /// Reject parameters the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be at least 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidInput("page_size must be at least 1".to_string()));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidInput(format!(
                "page_size must be at most {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.delay_ms < POLITE_DELAY_MS {
            tracing::warn!(
                delay_ms = self.delay_ms,
                "Geocoding delay below {} ms may violate the service usage policy",
                POLITE_DELAY_MS
            );
        }
        Ok(())
    }
}

/// Partial parameters from a start request; unset fields keep the configured value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterOverrides {
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl ParameterOverrides {
    pub fn apply_to(&self, base: GeocodeParameters) -> GeocodeParameters {
        GeocodeParameters {
            delay_ms: self.delay_ms.unwrap_or(base.delay_ms),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            page_size: self.page_size.unwrap_or(base.page_size),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = GeocodeParameters::default();
        assert_eq!(params.delay(), Duration::from_secs(1));
        assert_eq!(params.batch_size, 25);
        assert_eq!(params.page_size, 200);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let params = GeocodeParameters {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(Error::InvalidInput(_))));

        let params = GeocodeParameters {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_page_size_capped() {
        let params = GeocodeParameters {
            page_size: MAX_PAGE_SIZE,
            ..Default::default()
        };
        assert!(params.validate().is_ok());

        for page_size in [MAX_PAGE_SIZE + 1, usize::MAX] {
            let params = GeocodeParameters {
                page_size,
                ..Default::default()
            };
            assert!(matches!(params.validate(), Err(Error::InvalidInput(_))));
        }
    }

    #[test]
    fn test_short_delay_is_allowed() {
        let params = GeocodeParameters {
            delay_ms: 0,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_overrides_apply_only_set_fields() {
        let overrides: ParameterOverrides =
            serde_json::from_str(r#"{ "batch_size": 5, "max_retries": 0 }"#).unwrap();
        let params = overrides.apply_to(GeocodeParameters::default());
        assert_eq!(params.batch_size, 5);
        assert_eq!(params.max_retries, 0);
        assert_eq!(params.delay_ms, DEFAULT_DELAY_MS);
        assert_eq!(params.page_size, DEFAULT_PAGE_SIZE);
    }
}
