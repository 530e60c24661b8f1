//! Draft record database operations
//!
//! Drafts are created at fan-out time and mutated only by the worker
//! processing that draft. Terminal transitions are guarded so a draft never
//! reverts from succeeded/failed/cancelled.

use crate::error::{EngineError, EngineResult};
use crate::models::{DraftConfig, DraftRecord, DraftStatus, TranslatedSegment, Usage};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Create one queued draft row per configured pass
pub async fn create_drafts(
    pool: &SqlitePool,
    job_id: Uuid,
    project_id: Uuid,
    configs: &[DraftConfig],
) -> EngineResult<Vec<DraftRecord>> {
    let mut records = Vec::with_capacity(configs.len());
    let now = Utc::now();

    for (run_order, config) in configs.iter().enumerate() {
        let draft_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO drafts (
                draft_id, job_id, project_id, run_order, status,
                model, temperature, top_p, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 'queued', ?, ?, ?, '{}', ?, ?)
            "#,
        )
        .bind(draft_id.to_string())
        .bind(job_id.to_string())
        .bind(project_id.to_string())
        .bind(run_order as i64)
        .bind(&config.model)
        .bind(config.temperature)
        .bind(config.top_p)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(pool)
        .await?;

        records.push(DraftRecord {
            draft_id,
            job_id,
            project_id,
            run_order: run_order as i64,
            status: DraftStatus::Queued,
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            segments: None,
            merged_text: None,
            usage: None,
            error: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        });
    }

    Ok(records)
}

/// Claim a queued draft for execution. Returns false if the draft is no
/// longer queued (already claimed, or cancelled before starting).
pub async fn mark_draft_running(pool: &SqlitePool, draft_id: Uuid) -> EngineResult<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'running', updated_at = ? WHERE draft_id = ? AND status = 'queued'",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Persist a successful pass: segments, merged text, usage
pub async fn mark_draft_succeeded(
    pool: &SqlitePool,
    draft_id: Uuid,
    segments: &[TranslatedSegment],
    merged_text: &str,
    usage: &Usage,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE drafts
        SET status = 'succeeded', segments = ?, merged_text = ?, usage = ?, updated_at = ?
        WHERE draft_id = ? AND status NOT IN ('succeeded', 'failed', 'cancelled')
        "#,
    )
    .bind(serde_json::to_string(segments)?)
    .bind(merged_text)
    .bind(serde_json::to_string(usage)?)
    .bind(Utc::now().to_rfc3339())
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record a failed pass with its error
pub async fn mark_draft_failed(
    pool: &SqlitePool,
    draft_id: Uuid,
    error: &str,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE drafts
        SET status = 'failed', error = ?, updated_at = ?
        WHERE draft_id = ? AND status NOT IN ('succeeded', 'failed', 'cancelled')
        "#,
    )
    .bind(error)
    .bind(Utc::now().to_rfc3339())
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark one draft cancelled unless it already settled
pub async fn mark_draft_cancelled(
    pool: &SqlitePool,
    draft_id: Uuid,
    reason: &str,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE drafts
        SET status = 'cancelled', error = ?, updated_at = ?
        WHERE draft_id = ? AND status NOT IN ('succeeded', 'failed', 'cancelled')
        "#,
    )
    .bind(reason)
    .bind(Utc::now().to_rfc3339())
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Cancel every in-flight draft for a job. A draft already succeeded or
/// failed is left untouched: a late-arriving completion is never silently
/// overwritten by a cancellation that arrives after it.
pub async fn cancel_job_drafts(pool: &SqlitePool, job_id: Uuid, reason: &str) -> EngineResult<usize> {
    let result = sqlx::query(
        r#"
        UPDATE drafts
        SET status = 'cancelled', error = ?, updated_at = ?
        WHERE job_id = ? AND status IN ('queued', 'running')
        "#,
    )
    .bind(reason)
    .bind(Utc::now().to_rfc3339())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

/// Count drafts for a job still in {queued, running}
pub async fn count_open_drafts(pool: &SqlitePool, job_id: Uuid) -> EngineResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM drafts WHERE job_id = ? AND status IN ('queued', 'running')",
    )
    .bind(job_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Load all drafts for a job, ranked by run_order
pub async fn load_job_drafts(pool: &SqlitePool, job_id: Uuid) -> EngineResult<Vec<DraftRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT draft_id, job_id, project_id, run_order, status, model, temperature,
               top_p, segments, merged_text, usage, error, metadata, created_at, updated_at
        FROM drafts
        WHERE job_id = ?
        ORDER BY run_order
        "#,
    )
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(draft_from_row).collect()
}

fn draft_from_row(row: sqlx::sqlite::SqliteRow) -> EngineResult<DraftRecord> {
    let draft_id_str: String = row.get("draft_id");
    let draft_id = Uuid::parse_str(&draft_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse draft_id: {}", e)))?;

    let job_id_str: String = row.get("job_id");
    let job_id = Uuid::parse_str(&job_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse job_id: {}", e)))?;

    let project_id_str: String = row.get("project_id");
    let project_id = Uuid::parse_str(&project_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse project_id: {}", e)))?;

    let status_str: String = row.get("status");
    let status = DraftStatus::parse(&status_str)
        .ok_or_else(|| EngineError::Internal(format!("Unknown draft status: {}", status_str)))?;

    let segments: Option<String> = row.get("segments");
    let segments: Option<Vec<TranslatedSegment>> =
        segments.map(|s| serde_json::from_str(&s)).transpose()?;

    let usage: Option<String> = row.get("usage");
    let usage: Option<Usage> = usage.map(|s| serde_json::from_str(&s)).transpose()?;

    let metadata_text: String = row.get("metadata");
    let metadata: serde_json::Value = serde_json::from_str(&metadata_text)?;

    Ok(DraftRecord {
        draft_id,
        job_id,
        project_id,
        run_order: row.get("run_order"),
        status,
        model: row.get("model"),
        temperature: row.get("temperature"),
        top_p: row.get("top_p"),
        segments,
        merged_text: row.get("merged_text"),
        usage,
        error: row.get("error"),
        metadata,
        created_at: super::jobs::parse_timestamp(row.get("created_at"))?,
        updated_at: super::jobs::parse_timestamp(row.get("updated_at"))?,
    })
}
