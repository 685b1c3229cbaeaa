//! Test Helper Utilities
//!
//! Shared fakes and database setup for alumni-geocoder integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use alumni_common::{Error, Result};
use alumni_geocoder::db::profiles::{self, AlumniProfile};
use alumni_geocoder::db::SqliteProfileStore;
use alumni_geocoder::models::{AddressFields, Coordinates};
use alumni_geocoder::types::{GeocodeError, Geocoder, ProfileStore};

/// Create a temporary file database with tables initialized
///
/// The TempDir must be kept alive for the duration of the test.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = alumni_geocoder::db::init_database_pool(&temp_dir.path().join("alumni.db"))
        .await
        .expect("Failed to create test database");
    (temp_dir, pool)
}

/// Insert `count` profiles `u00..` with street address `"<n> Elm St"` and no coordinates
pub async fn seed_profiles(pool: &SqlitePool, count: usize) {
    for n in 0..count {
        seed_profile(pool, &format!("u{:02}", n), Some(&format!("{} Elm St", n))).await;
    }
}

pub async fn seed_profile(pool: &SqlitePool, user_id: &str, address: Option<&str>) {
    let profile = AlumniProfile {
        user_id: user_id.to_string(),
        full_name: Some(format!("Alumnus {}", user_id)),
        address: address.map(str::to_string),
        ..Default::default()
    };
    profiles::save_profile(pool, &profile)
        .await
        .expect("Failed to seed profile");
}

pub async fn seed_located_profile(pool: &SqlitePool, user_id: &str, coordinates: Coordinates) {
    let profile = AlumniProfile {
        user_id: user_id.to_string(),
        full_name: Some(format!("Alumnus {}", user_id)),
        address: Some("1 Located Rd".to_string()),
        latitude: Some(coordinates.latitude),
        longitude: Some(coordinates.longitude),
        location_updated_at: Some(Utc::now()),
        ..Default::default()
    };
    profiles::save_profile(pool, &profile)
        .await
        .expect("Failed to seed profile");
}

/// Rows where exactly one of latitude/longitude is set
pub async fn count_half_set(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM alumni_profiles WHERE (latitude IS NULL) <> (longitude IS NULL)",
    )
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Shared, ordered record of geocode and write calls
#[derive(Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<String>>>);

impl OpLog {
    pub fn push(&self, op: String) {
        self.0.lock().unwrap().push(op);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, op: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|o| o == op)
    }
}

type Scripted = VecDeque<std::result::Result<Option<Coordinates>, GeocodeError>>;

/// Scriptable [`Geocoder`]
///
/// Unscripted queries resolve to coordinates derived from the call number.
#[derive(Default)]
pub struct FakeGeocoder {
    scripts: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<(String, tokio::time::Instant)>>,
    log: Option<OpLog>,
    latency: Duration,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `responses` in order, then fall back to resolving
    pub fn script(
        self,
        query: &str,
        responses: Vec<std::result::Result<Option<Coordinates>, GeocodeError>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(query.to_string(), responses.into());
        self
    }

    pub fn with_log(mut self, log: OpLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Cancel `token` while answering call number `calls` (1-based)
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn calls_for(&self, query: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(q, _)| q == query).count()
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, query: &str) -> std::result::Result<Option<Coordinates>, GeocodeError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((query.to_string(), tokio::time::Instant::now()));
            calls.len()
        };
        if let Some(log) = &self.log {
            log.push(format!("geocode:{}", query));
        }
        if let Some((after, token)) = &self.cancel_after {
            if call_number == *after {
                token.cancel();
            }
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(query)
            .and_then(|responses| responses.pop_front());
        match scripted {
            Some(response) => response,
            None => Ok(Some(Coordinates::new(
                call_number as f64,
                -(call_number as f64),
            ))),
        }
    }
}

/// [`ProfileStore`] over SQLite that logs every write
pub struct LoggingStore {
    inner: SqliteProfileStore,
    log: OpLog,
}

impl LoggingStore {
    pub fn new(pool: SqlitePool, log: OpLog) -> Self {
        Self {
            inner: SqliteProfileStore::new(pool),
            log,
        }
    }
}

#[async_trait]
impl ProfileStore for LoggingStore {
    async fn fetch_missing_coordinates(&self, page_size: usize) -> Result<Vec<AddressFields>> {
        self.inner.fetch_missing_coordinates(page_size).await
    }

    async fn update_coordinates(
        &self,
        user_id: &str,
        coordinates: Coordinates,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.log.push(format!("write:{}", user_id));
        self.inner
            .update_coordinates(user_id, coordinates, updated_at)
            .await
    }
}

/// [`ProfileStore`] whose reads always fail
#[derive(Default)]
pub struct UnreachableStore {
    pub writes: Mutex<usize>,
}

#[async_trait]
impl ProfileStore for UnreachableStore {
    async fn fetch_missing_coordinates(&self, _page_size: usize) -> Result<Vec<AddressFields>> {
        Err(Error::Internal("connection refused".to_string()))
    }

    async fn update_coordinates(
        &self,
        _user_id: &str,
        _coordinates: Coordinates,
        _updated_at: DateTime<Utc>,
    ) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}
