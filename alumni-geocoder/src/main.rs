//! alumni-geocoder - batch geocoding service for alumni profiles
//!
//! Resolves profile addresses to coordinates at a fixed request pace and
//! writes them back for the alumni map. Runs are started, watched and
//! cancelled over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use alumni_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use alumni_common::events::EventBus;

use alumni_geocoder::config::{resolve_bind_address, GeocoderSettings};
use alumni_geocoder::services::NominatimClient;
use alumni_geocoder::AppState;

const MODULE_NAME: &str = "alumni-geocoder";

/// Command-line arguments for alumni-geocoder
#[derive(Parser, Debug)]
#[command(name = "alumni-geocoder")]
#[command(about = "Batch geocoding service for alumni profiles")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ALUMNI_GEOCODER_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the alumni database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:5740
    #[arg(short, long, env = "ALUMNI_GEOCODER_BIND")]
    bind: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "ALUMNI_GEOCODER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path(MODULE_NAME));
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => TomlConfig::default(),
    };

    // RUST_LOG → --log-level → [logging] level → info
    let fallback_level = args
        .log_level
        .clone()
        .or_else(|| toml_config.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config directory available, using defaults"),
    }

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml_config(&toml_config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = alumni_geocoder::db::init_database_pool(&db_path).await?;

    let stale = alumni_geocoder::db::runs::cleanup_stale_runs(&db_pool).await?;
    if stale > 0 {
        warn!("Marked {} interrupted geocoding run(s) as CANCELLED", stale);
    }

    let settings = GeocoderSettings::resolve(&toml_config)?;
    let geocoder = NominatimClient::new(
        settings.endpoint.clone(),
        &settings.user_agent,
        settings.request_timeout,
    )
    .map_err(|e| anyhow::anyhow!("Failed to create geocoding client: {}", e))?;

    let event_bus = EventBus::new(100);
    let state = AppState::new(db_pool, event_bus, settings, Arc::new(geocoder));
    let tokens = state.cancellation_tokens.clone();
    let runs = state.clone();
    let app = alumni_geocoder::build_router(state);

    let bind = resolve_bind_address(args.bind, &toml_config);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop active runs while open connections drain
            for token in tokens.read().await.values() {
                token.cancel();
            }
        })
        .await
        .context("Server error")?;

    // Active runs persist what they resolved before the runtime goes away
    runs.shutdown_runs().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
