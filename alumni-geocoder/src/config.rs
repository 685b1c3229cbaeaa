//! Configuration resolution for alumni-geocoder
//!
//! Geocoding settings resolve with ENV → TOML → compiled default priority,
//! field by field.

use std::time::Duration;
use tracing::info;
use alumni_common::config::TomlConfig;
use alumni_common::{Error, Result};

use crate::models::GeocodeParameters;
use crate::services::nominatim_client::{
    DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};

pub const ENV_ENDPOINT: &str = "ALUMNI_GEOCODER_ENDPOINT";
pub const ENV_USER_AGENT: &str = "ALUMNI_GEOCODER_USER_AGENT";
pub const ENV_DELAY_MS: &str = "ALUMNI_GEOCODER_DELAY_MS";
pub const ENV_BATCH_SIZE: &str = "ALUMNI_GEOCODER_BATCH_SIZE";
pub const ENV_PAGE_SIZE: &str = "ALUMNI_GEOCODER_PAGE_SIZE";
pub const ENV_MAX_RETRIES: &str = "ALUMNI_GEOCODER_MAX_RETRIES";

pub const DEFAULT_BIND: &str = "127.0.0.1:5740";

/// Resolved geocoding settings
#[derive(Debug, Clone, PartialEq)]
pub struct GeocoderSettings {
    pub endpoint: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Parameters used when a start request leaves a field unset
    pub defaults: GeocodeParameters,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            defaults: GeocodeParameters::default(),
        }
    }
}

impl GeocoderSettings {
    /// Resolve from the process environment and `toml_config`
    pub fn resolve(toml_config: &TomlConfig) -> Result<Self> {
        Self::resolve_with(toml_config, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve_with<F>(toml_config: &TomlConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let toml = &toml_config.geocoding;
        let base = Self::default();

        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let endpoint = env(ENV_ENDPOINT)
            .or_else(|| toml.endpoint.clone())
            .unwrap_or(base.endpoint);

        let user_agent = env(ENV_USER_AGENT)
            .or_else(|| toml.user_agent.clone())
            .unwrap_or(base.user_agent);
        if user_agent.trim().is_empty() {
            return Err(Error::Config(
                "Geocoder user agent must not be empty".to_string(),
            ));
        }

        let defaults = GeocodeParameters {
            delay_ms: parse_env(ENV_DELAY_MS, env(ENV_DELAY_MS))?
                .or(toml.delay_ms)
                .unwrap_or(base.defaults.delay_ms),
            batch_size: parse_env(ENV_BATCH_SIZE, env(ENV_BATCH_SIZE))?
                .or(toml.batch_size)
                .unwrap_or(base.defaults.batch_size),
            page_size: parse_env(ENV_PAGE_SIZE, env(ENV_PAGE_SIZE))?
                .or(toml.page_size)
                .unwrap_or(base.defaults.page_size),
            max_retries: parse_env(ENV_MAX_RETRIES, env(ENV_MAX_RETRIES))?
                .or(toml.max_retries)
                .unwrap_or(base.defaults.max_retries),
        };
        defaults
            .validate()
            .map_err(|e| Error::Config(format!("Invalid geocoding defaults: {}", e)))?;

        let request_timeout = toml
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(base.request_timeout);

        info!(
            endpoint = %endpoint,
            delay_ms = defaults.delay_ms,
            batch_size = defaults.batch_size,
            page_size = defaults.page_size,
            max_retries = defaults.max_retries,
            "Geocoder settings resolved"
        );

        Ok(Self {
            endpoint,
            user_agent,
            request_timeout,
            defaults,
        })
    }
}

fn parse_env<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{}={:?}: {}", key, raw, e)))
        })
        .transpose()
}

/// Bind address: CLI → TOML → default
pub fn resolve_bind_address(cli_bind: Option<String>, toml_config: &TomlConfig) -> String {
    cli_bind
        .or_else(|| toml_config.server.bind.clone())
        .unwrap_or_else(|| DEFAULT_BIND.to_string())
}
