//! Job Ledger database operations
//!
//! The ledger is the source of truth for "is this unit of work still alive".
//! Transition guards are single conditional UPDATEs checked via
//! `rows_affected`, so two workers racing over the same job cannot
//! double-start it and a late success can never overwrite a cancellation.

use crate::error::{EngineError, EngineResult};
use crate::models::{Job, JobStatus, JobType};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert a `queued` job. No side effects beyond the insert.
pub async fn enqueue(
    pool: &SqlitePool,
    job_type: JobType,
    project_id: Uuid,
    user_id: Uuid,
    workflow_run_id: Option<Uuid>,
    payload: serde_json::Value,
) -> EngineResult<Uuid> {
    let job_id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    let payload_text = serde_json::to_string(&payload)?;

    sqlx::query(
        r#"
        INSERT INTO jobs (
            job_id, job_type, status, project_id, user_id, workflow_run_id,
            attempts, synthesis_queued, payload, created_at, updated_at
        ) VALUES (?, ?, 'queued', ?, ?, ?, 0, 0, ?, ?, ?)
        "#,
    )
    .bind(job_id.to_string())
    .bind(job_type.as_str())
    .bind(project_id.to_string())
    .bind(user_id.to_string())
    .bind(workflow_run_id.map(|id| id.to_string()))
    .bind(&payload_text)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(job_id = %job_id, job_type = job_type.as_str(), project_id = %project_id, "Job enqueued");

    Ok(job_id)
}

/// Transition `queued → running`, setting `started_at` if unset.
///
/// Returns false (no-op) if the job is not currently `queued`. This is the
/// idempotency guard preventing a job picked up by two workers from being
/// started twice.
pub async fn mark_running(pool: &SqlitePool, job_id: Uuid) -> EngineResult<bool> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'running',
            started_at = COALESCE(started_at, ?),
            attempts = attempts + 1,
            updated_at = ?
        WHERE job_id = ? AND status = 'queued'
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Transition to `done` unless already cancelled. Cancellation always wins
/// over a late success.
pub async fn mark_succeeded(pool: &SqlitePool, job_id: Uuid) -> EngineResult<bool> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'done', finished_at = ?, updated_at = ?
        WHERE job_id = ? AND status NOT IN ('cancelled', 'done', 'failed')
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Transition to `failed` unless already cancelled; records the reason.
pub async fn mark_failed(pool: &SqlitePool, job_id: Uuid, reason: &str) -> EngineResult<bool> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed', last_error = ?, finished_at = ?, updated_at = ?
        WHERE job_id = ? AND status NOT IN ('cancelled', 'done', 'failed')
        "#,
    )
    .bind(reason)
    .bind(&now)
    .bind(&now)
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        tracing::warn!(job_id = %job_id, reason, "Job failed");
    }

    Ok(result.rows_affected() == 1)
}

/// Unconditionally set `cancelled`. The only transition allowed from any
/// state at any time: an explicit cancel overrides even done/failed.
pub async fn mark_cancelled(
    pool: &SqlitePool,
    job_id: Uuid,
    reason: Option<&str>,
) -> EngineResult<()> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'cancelled',
            last_error = COALESCE(?, last_error),
            finished_at = COALESCE(finished_at, ?),
            updated_at = ?
        WHERE job_id = ?
        "#,
    )
    .bind(reason)
    .bind(&now)
    .bind(&now)
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    tracing::info!(job_id = %job_id, "Job cancelled");

    Ok(())
}

/// Cooperative cancellation checkpoint. Long-running workers poll this
/// before model invocation and again before persisting results.
pub async fn is_cancelled(pool: &SqlitePool, job_id: Uuid) -> EngineResult<bool> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM jobs WHERE job_id = ?")
            .bind(job_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(matches!(status.as_deref(), Some("cancelled")))
}

/// Claim the "queue synthesis" step. Single conditional update (set flag
/// only if not already set) so exactly one of N concurrently-finishing
/// drafts performs the fan-in.
pub async fn claim_synthesis(pool: &SqlitePool, job_id: Uuid) -> EngineResult<bool> {
    let result = sqlx::query(
        "UPDATE jobs SET synthesis_queued = 1, updated_at = ? WHERE job_id = ? AND synthesis_queued = 0",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Load a job by id
pub async fn get_job(pool: &SqlitePool, job_id: Uuid) -> EngineResult<Option<Job>> {
    let row = sqlx::query(
        r#"
        SELECT job_id, job_type, status, project_id, user_id, workflow_run_id,
               attempts, last_error, synthesis_queued, payload,
               created_at, started_at, finished_at, updated_at
        FROM jobs
        WHERE job_id = ?
        "#,
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(job_from_row).transpose()
}

/// Claim the oldest eligible queued job of the given type.
///
/// Combines the poll and the `mark_running` guard: the SELECT finds a
/// candidate, the conditional UPDATE claims it, and a lost race simply
/// yields None for this poll cycle.
pub async fn claim_next_queued(
    pool: &SqlitePool,
    job_type: JobType,
) -> EngineResult<Option<Job>> {
    let candidate: Option<String> = sqlx::query_scalar(
        "SELECT job_id FROM jobs WHERE status = 'queued' AND job_type = ? ORDER BY created_at LIMIT 1",
    )
    .bind(job_type.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(id_str) = candidate else {
        return Ok(None);
    };

    let job_id = Uuid::parse_str(&id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse job_id: {}", e)))?;

    if !mark_running(pool, job_id).await? {
        // Another worker won the claim between the SELECT and the UPDATE
        return Ok(None);
    }

    get_job(pool, job_id).await
}

/// Cancel jobs left `queued`/`running` by a previous process. Any such job
/// has no owning worker and will never progress.
pub async fn cleanup_stale_jobs(pool: &SqlitePool) -> EngineResult<usize> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'cancelled',
            last_error = 'Cancelled - engine was restarted',
            finished_at = ?,
            updated_at = ?
        WHERE status IN ('queued', 'running')
        "#,
    )
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

fn job_from_row(row: sqlx::sqlite::SqliteRow) -> EngineResult<Job> {
    let job_id_str: String = row.get("job_id");
    let job_id = Uuid::parse_str(&job_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse job_id: {}", e)))?;

    let job_type_str: String = row.get("job_type");
    let job_type = JobType::parse(&job_type_str)
        .ok_or_else(|| EngineError::Internal(format!("Unknown job_type: {}", job_type_str)))?;

    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| EngineError::Internal(format!("Unknown job status: {}", status_str)))?;

    let project_id_str: String = row.get("project_id");
    let project_id = Uuid::parse_str(&project_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse project_id: {}", e)))?;

    let user_id_str: String = row.get("user_id");
    let user_id = Uuid::parse_str(&user_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse user_id: {}", e)))?;

    let workflow_run_id: Option<String> = row.get("workflow_run_id");
    let workflow_run_id = workflow_run_id
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| EngineError::Internal(format!("Failed to parse workflow_run_id: {}", e)))?;

    let payload_text: String = row.get("payload");
    let payload: serde_json::Value = serde_json::from_str(&payload_text)?;

    Ok(Job {
        job_id,
        job_type,
        status,
        project_id,
        user_id,
        workflow_run_id,
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        synthesis_queued: row.get::<i64, _>("synthesis_queued") != 0,
        payload,
        created_at: parse_timestamp(row.get("created_at"))?,
        started_at: parse_optional_timestamp(row.get("started_at"))?,
        finished_at: parse_optional_timestamp(row.get("finished_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

pub(crate) fn parse_timestamp(s: String) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Internal(format!("Failed to parse timestamp: {}", e)))
}

pub(crate) fn parse_optional_timestamp(s: Option<String>) -> EngineResult<Option<DateTime<Utc>>> {
    s.map(parse_timestamp).transpose()
}
