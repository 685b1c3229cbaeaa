//! Geocode run database operations
//!
//! Runs are persisted so the status endpoint survives the background task
//! and a restart can close runs that were left open.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;
use alumni_common::{Error, Result};

use crate::models::{GeocodeParameters, GeocodeRun, RunProgress, RunState, RunSummary};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const SELECT_COLUMNS: &str = r#"
    SELECT run_id, state, parameters, progress_done, progress_total,
           summary, error, started_at, ended_at
    FROM geocode_runs
"#;

/// Insert or update a run record
pub async fn save_run(pool: &SqlitePool, run: &GeocodeRun) -> Result<()> {
    // Serialize before touching the pool
    let run_id = run.run_id.to_string();
    let state = run.state.as_str();
    let parameters = serde_json::to_string(&run.parameters)
        .map_err(|e| Error::Internal(format!("Failed to serialize parameters: {}", e)))?;
    let summary = run
        .summary
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize summary: {}", e)))?;
    let progress_done = run.progress.done as i64;
    let progress_total = run.progress.total as i64;
    let started_at = run.started_at.to_rfc3339();
    let ended_at = run.ended_at.map(|dt| dt.to_rfc3339());

    retry_on_lock("save_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO geocode_runs (
                run_id, state, parameters, progress_done, progress_total,
                summary, error, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                state = excluded.state,
                progress_done = excluded.progress_done,
                progress_total = excluded.progress_total,
                summary = excluded.summary,
                error = excluded.error,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&run_id)
        .bind(state)
        .bind(&parameters)
        .bind(progress_done)
        .bind(progress_total)
        .bind(&summary)
        .bind(&run.error)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load a run by id
pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<GeocodeRun>> {
    let row = sqlx::query(&format!("{} WHERE run_id = ?", SELECT_COLUMNS))
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|row| run_from_row(&row)).transpose()
}

/// Most recently started run that has not reached a terminal state
pub async fn get_active_run(pool: &SqlitePool) -> Result<Option<GeocodeRun>> {
    let row = sqlx::query(&format!(
        "{} WHERE state NOT IN ('COMPLETED', 'CANCELLED', 'FAILED') ORDER BY started_at DESC LIMIT 1",
        SELECT_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    row.map(|row| run_from_row(&row)).transpose()
}

/// Check if any run is currently active
pub async fn has_running_run(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM geocode_runs
        WHERE state NOT IN ('COMPLETED', 'CANCELLED', 'FAILED')
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Record the latest progress of a run without rewriting the whole row
pub async fn update_progress(
    pool: &SqlitePool,
    run_id: Uuid,
    done: usize,
    total: usize,
) -> Result<()> {
    let run_id = run_id.to_string();

    retry_on_lock("update_run_progress", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            "UPDATE geocode_runs SET progress_done = ?, progress_total = ? WHERE run_id = ?",
        )
        .bind(done as i64)
        .bind(total as i64)
        .bind(&run_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Mark runs left open by a previous process as CANCELLED
///
/// The background task that drove them is gone, so they would never finish.
pub async fn cleanup_stale_runs(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE geocode_runs
        SET state = 'CANCELLED',
            ended_at = ?,
            error = 'Run interrupted by service restart'
        WHERE state NOT IN ('COMPLETED', 'CANCELLED', 'FAILED')
        "#,
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

fn run_from_row(row: &SqliteRow) -> Result<GeocodeRun> {
    let run_id: String = row.get("run_id");
    let run_id = Uuid::parse_str(&run_id)
        .map_err(|e| Error::Internal(format!("Failed to parse run_id: {}", e)))?;

    let state: String = row.get("state");
    let state: RunState = state.parse()?;

    let parameters: String = row.get("parameters");
    let parameters: GeocodeParameters = serde_json::from_str(&parameters)
        .map_err(|e| Error::Internal(format!("Failed to deserialize parameters: {}", e)))?;

    let summary: Option<String> = row.get("summary");
    let summary: Option<RunSummary> = summary
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize summary: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| Error::Internal(format!("Failed to parse started_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse ended_at: {}", e)))?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let done = row.get::<i64, _>("progress_done") as usize;
    let total = row.get::<i64, _>("progress_total") as usize;

    let mut run = GeocodeRun {
        run_id,
        state,
        parameters,
        progress: RunProgress::default(),
        summary,
        error: row.get("error"),
        started_at,
        ended_at,
    };
    run.update_progress(crate::models::Progress::new(done, total));

    Ok(run)
}
