//! Alumni profile database operations
//!
//! The geocoder only ever touches the three location columns of existing
//! rows. `save_profile` exists for seeding and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use alumni_common::{Error, Result};

use crate::models::{AddressFields, Coordinates, LocatedProfile};
use crate::types::ProfileStore;
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Alumni profile row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlumniProfile {
    pub user_id: String,
    pub full_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_updated_at: Option<DateTime<Utc>>,
}

impl AlumniProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }
}

/// Insert or replace a profile
pub async fn save_profile(pool: &SqlitePool, profile: &AlumniProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO alumni_profiles (
            user_id, full_name, address, city, province, country,
            latitude, longitude, location_updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            full_name = excluded.full_name,
            address = excluded.address,
            city = excluded.city,
            province = excluded.province,
            country = excluded.country,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            location_updated_at = excluded.location_updated_at
        "#,
    )
    .bind(&profile.user_id)
    .bind(&profile.full_name)
    .bind(&profile.address)
    .bind(&profile.city)
    .bind(&profile.province)
    .bind(&profile.country)
    .bind(profile.latitude)
    .bind(profile.longitude)
    .bind(profile.location_updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one profile by user id
pub async fn load_profile(pool: &SqlitePool, user_id: &str) -> Result<Option<AlumniProfile>> {
    let profile = sqlx::query_as::<_, AlumniProfile>(
        r#"
        SELECT user_id, full_name, address, city, province, country,
               latitude, longitude, location_updated_at
        FROM alumni_profiles
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Geocoding candidates: no latitude yet and a non-blank street address
///
/// Blank means empty after trimming ASCII whitespace, the same set
/// `format_address` trims, so every returned row yields a query.
pub async fn fetch_missing_coordinates(
    pool: &SqlitePool,
    page_size: usize,
) -> Result<Vec<AddressFields>> {
    let rows = sqlx::query_as::<_, AddressFields>(
        r#"
        SELECT user_id, address, city, province, country
        FROM alumni_profiles
        WHERE latitude IS NULL
          AND address IS NOT NULL
          AND TRIM(address, ' ' || char(9) || char(10) || char(12) || char(13)) <> ''
        ORDER BY user_id
        LIMIT ?
        "#,
    )
    .bind(i64::try_from(page_size).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Number of geocoding candidates
pub async fn count_missing_coordinates(pool: &SqlitePool) -> Result<usize> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM alumni_profiles
        WHERE latitude IS NULL
          AND address IS NOT NULL
          AND TRIM(address, ' ' || char(9) || char(10) || char(12) || char(13)) <> ''
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count as usize)
}

/// Profiles with coordinates, for map markers
pub async fn list_located(pool: &SqlitePool) -> Result<Vec<LocatedProfile>> {
    let rows = sqlx::query_as::<_, LocatedProfile>(
        r#"
        SELECT user_id, full_name, latitude, longitude
        FROM alumni_profiles
        WHERE latitude IS NOT NULL AND longitude IS NOT NULL
        ORDER BY user_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Set latitude, longitude and timestamp of one profile in a single statement
///
/// Returns `NotFound` when no row has `user_id`.
pub async fn update_coordinates(
    pool: &SqlitePool,
    user_id: &str,
    coordinates: Coordinates,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    let rows_affected = retry_on_lock(
        "update_coordinates",
        DEFAULT_MAX_LOCK_WAIT_MS,
        move || async move {
            let result = sqlx::query(
                r#"
                UPDATE alumni_profiles
                SET latitude = ?, longitude = ?, location_updated_at = ?
                WHERE user_id = ?
                "#,
            )
            .bind(coordinates.latitude)
            .bind(coordinates.longitude)
            .bind(updated_at)
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(Error::Database)?;

            Ok(result.rows_affected())
        },
    )
    .await?;

    if rows_affected == 0 {
        return Err(Error::NotFound(format!("Alumni profile not found: {}", user_id)));
    }

    Ok(())
}

/// [`ProfileStore`] backed by the SQLite pool
#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn fetch_missing_coordinates(&self, page_size: usize) -> Result<Vec<AddressFields>> {
        fetch_missing_coordinates(&self.pool, page_size).await
    }

    async fn update_coordinates(
        &self,
        user_id: &str,
        coordinates: Coordinates,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        update_coordinates(&self.pool, user_id, coordinates, updated_at).await
    }
}
