//! Sequential stage pipeline persistence
//!
//! Stage outputs accumulate additively (`INSERT OR IGNORE`): once a stage has
//! written its result for a segment, that output is never overwritten. Job
//! progress ("current stage") is a read-side projection over these rows, not
//! a stored pointer that could drift.

use crate::error::{EngineError, EngineResult};
use crate::models::{BatchItem, GuardFinding, StageSegment, StageSegmentStatus};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

/// Create the stage segment rows for a job from its batched segments
pub async fn create_stage_segments(
    pool: &SqlitePool,
    job_id: Uuid,
    items: &[BatchItem],
) -> EngineResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO stage_segments (
                job_id, segment_id, segment_index, text_source, prev_ctx, next_ctx, status
            ) VALUES (?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(job_id.to_string())
        .bind(&item.segment.id)
        .bind(item.segment.order as i64)
        .bind(&item.segment.text)
        .bind(&item.prev_ctx)
        .bind(&item.next_ctx)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Record one stage's output for one segment. Additive: returns false if an
/// output for (job, segment, stage) already exists.
pub async fn record_stage_output(
    pool: &SqlitePool,
    job_id: Uuid,
    segment_id: &str,
    stage: &str,
    output: &str,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO stage_outputs (job_id, segment_id, stage, output, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(job_id.to_string())
    .bind(segment_id)
    .bind(stage)
    .bind(output)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Outputs of one stage for a job, keyed by segment id
pub async fn load_stage_outputs(
    pool: &SqlitePool,
    job_id: Uuid,
    stage: &str,
) -> EngineResult<HashMap<String, String>> {
    let rows = sqlx::query(
        "SELECT segment_id, output FROM stage_outputs WHERE job_id = ? AND stage = ?",
    )
    .bind(job_id.to_string())
    .bind(stage)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("segment_id"), row.get("output")))
        .collect())
}

/// Count segments with a recorded output for the given stage
pub async fn count_stage_outputs(pool: &SqlitePool, job_id: Uuid, stage: &str) -> EngineResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM stage_outputs WHERE job_id = ? AND stage = ?")
            .bind(job_id.to_string())
            .bind(stage)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

/// Total stage segment rows for a job
pub async fn count_segments(pool: &SqlitePool, job_id: Uuid) -> EngineResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stage_segments WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Set a segment's terminal status (done or needs_review), recording guard
/// findings when flagged
pub async fn finish_segment(
    pool: &SqlitePool,
    job_id: Uuid,
    segment_id: &str,
    status: StageSegmentStatus,
    findings: &[GuardFinding],
) -> EngineResult<()> {
    let findings_text = if findings.is_empty() {
        None
    } else {
        Some(serde_json::to_string(findings)?)
    };

    sqlx::query(
        "UPDATE stage_segments SET status = ?, findings = ? WHERE job_id = ? AND segment_id = ?",
    )
    .bind(status.as_str())
    .bind(findings_text)
    .bind(job_id.to_string())
    .bind(segment_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Cancel rows still in progress for a job, excluding rows already in a
/// terminal state: a late-arriving completion must not be overwritten by a
/// cancellation that arrives after it.
pub async fn cancel_job_segments(pool: &SqlitePool, job_id: Uuid) -> EngineResult<usize> {
    let result = sqlx::query(
        r#"
        UPDATE stage_segments
        SET status = 'cancelled'
        WHERE job_id = ? AND status NOT IN ('done', 'needs_review')
        "#,
    )
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

/// Load all stage segment rows for a job, in document order
pub async fn load_job_segments(pool: &SqlitePool, job_id: Uuid) -> EngineResult<Vec<StageSegment>> {
    let rows = sqlx::query(
        r#"
        SELECT job_id, segment_id, segment_index, text_source, prev_ctx, next_ctx, status, findings
        FROM stage_segments
        WHERE job_id = ?
        ORDER BY segment_index
        "#,
    )
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let status_str: String = row.get("status");
            let status = StageSegmentStatus::parse(&status_str).ok_or_else(|| {
                EngineError::Internal(format!("Unknown stage segment status: {}", status_str))
            })?;

            let findings: Option<String> = row.get("findings");
            let findings: Vec<GuardFinding> = match findings {
                Some(text) => serde_json::from_str(&text)?,
                None => Vec::new(),
            };

            Ok(StageSegment {
                job_id,
                segment_id: row.get("segment_id"),
                segment_index: row.get::<i64, _>("segment_index") as usize,
                text_source: row.get("text_source"),
                prev_ctx: row.get("prev_ctx"),
                next_ctx: row.get("next_ctx"),
                status,
                findings,
            })
        })
        .collect()
}
