//! Configuration loading and root folder resolution
//!
//! Missing configuration files are never fatal: a warning is logged and
//! compiled defaults apply. A file that exists but cannot be parsed is a
//! configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config/data folders
pub const APP_DIR_NAME: &str = "alumni-geo";

/// Environment variable overriding the root folder
pub const ENV_ROOT_FOLDER: &str = "ALUMNI_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "alumni.db";

/// Top-level TOML configuration shared by the alumni geo services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// `[server]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on, e.g. "127.0.0.1:5740"
    #[serde(default)]
    pub bind: Option<String>,
}

/// `[geocoding]` section
///
/// Every field is optional; unset fields fall back to environment
/// variables or compiled defaults in the consuming service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Search endpoint of a Nominatim-compatible service
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Descriptive client identifier sent as User-Agent
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Minimum spacing between two requests in milliseconds
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Addresses resolved before results are persisted
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Maximum number of candidate profiles read per run
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Retries for transient failures (0 disables retrying)
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Per-request HTTP timeout in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Default config file path for a module: `<config_dir>/alumni-geo/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(format!("{}.toml", module_name)))
}

/// Load TOML configuration from `path`
///
/// A missing file yields the default configuration.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config = toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Parse TOML {} failed: {}", path.display(), e))
            })?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(
                "Config file {} not found, using default configuration",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        Err(err) => Err(Error::Io(err)),
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./alumni_geo_data"))
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `ALUMNI_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent compiled default
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_config(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ENV_ROOT_FOLDER) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ENV_ROOT_FOLDER, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML config: {}", path.display());
            return path.clone();
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// Creates the root folder on first start and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder {}", self.root_folder.display());
        } else if !self.root_folder.is_dir() {
            return Err(Error::Config(format!(
                "Root folder is not a directory: {}",
                self.root_folder.display()
            )));
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}
