//! Database access for alumni-geocoder

pub mod profiles;
pub mod runs;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

pub use profiles::SqliteProfileStore;

/// Initialize database connection pool
///
/// Opens (or creates) the SQLite database and ensures the tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the alumni_profiles and geocode_runs tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> alumni_common::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alumni_profiles (
            user_id TEXT PRIMARY KEY,
            full_name TEXT,
            address TEXT,
            city TEXT,
            province TEXT,
            country TEXT,
            latitude REAL,
            longitude REAL,
            location_updated_at TEXT,
            CHECK ((latitude IS NULL) = (longitude IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS geocode_runs (
            run_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            parameters TEXT NOT NULL,
            progress_done INTEGER NOT NULL DEFAULT 0,
            progress_total INTEGER NOT NULL DEFAULT 0,
            summary TEXT,
            error TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (alumni_profiles, geocode_runs)");

    Ok(())
}
