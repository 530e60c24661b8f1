//! Final translation persistence
//!
//! The final translation is upserted by (project, job) and its segment rows
//! are replaced delete-then-insert, scoped to that translation and variant,
//! so re-running synthesis for the same job is safe.

use crate::error::{EngineError, EngineResult};
use crate::models::{FinalSegment, FinalTranslation};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Upsert the final translation and replace its segment rows
pub async fn save_final_translation(
    pool: &SqlitePool,
    final_translation: &FinalTranslation,
    segments: &[FinalSegment],
) -> EngineResult<()> {
    let draft_ids: Vec<String> = final_translation
        .synthesis_draft_ids
        .iter()
        .map(|id| id.to_string())
        .collect();

    sqlx::query(
        r#"
        INSERT INTO final_translations (
            project_id, job_id, variant, is_final, source_hash,
            synthesis_draft_ids, merged_text, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(project_id, job_id) DO UPDATE SET
            variant = excluded.variant,
            is_final = excluded.is_final,
            source_hash = excluded.source_hash,
            synthesis_draft_ids = excluded.synthesis_draft_ids,
            merged_text = excluded.merged_text,
            completed_at = excluded.completed_at
        "#,
    )
    .bind(final_translation.project_id.to_string())
    .bind(final_translation.job_id.to_string())
    .bind(&final_translation.variant)
    .bind(final_translation.is_final as i64)
    .bind(&final_translation.source_hash)
    .bind(serde_json::to_string(&draft_ids)?)
    .bind(&final_translation.merged_text)
    .bind(final_translation.completed_at.to_rfc3339())
    .execute(pool)
    .await?;

    // Replace any prior final segment rows for this translation + variant
    sqlx::query("DELETE FROM final_segments WHERE project_id = ? AND job_id = ? AND variant = ?")
        .bind(final_translation.project_id.to_string())
        .bind(final_translation.job_id.to_string())
        .bind(&final_translation.variant)
        .execute(pool)
        .await?;

    for segment in segments {
        sqlx::query(
            r#"
            INSERT INTO final_segments (
                project_id, job_id, variant, segment_index, segment_id,
                text, rationale, chosen_run_order
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(final_translation.project_id.to_string())
        .bind(final_translation.job_id.to_string())
        .bind(&final_translation.variant)
        .bind(segment.segment_index as i64)
        .bind(&segment.segment_id)
        .bind(&segment.text)
        .bind(&segment.rationale)
        .bind(segment.chosen_run_order)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Load the final translation for (project, job), if synthesis completed
pub async fn get_final_translation(
    pool: &SqlitePool,
    project_id: Uuid,
    job_id: Uuid,
) -> EngineResult<Option<FinalTranslation>> {
    let row = sqlx::query(
        r#"
        SELECT project_id, job_id, variant, is_final, source_hash,
               synthesis_draft_ids, merged_text, completed_at
        FROM final_translations
        WHERE project_id = ? AND job_id = ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let draft_ids_text: String = row.get("synthesis_draft_ids");
            let draft_id_strs: Vec<String> = serde_json::from_str(&draft_ids_text)?;
            let synthesis_draft_ids = draft_id_strs
                .iter()
                .map(|s| Uuid::parse_str(s))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| EngineError::Internal(format!("Failed to parse draft id: {}", e)))?;

            Ok(Some(FinalTranslation {
                project_id,
                job_id,
                variant: row.get("variant"),
                is_final: row.get::<i64, _>("is_final") != 0,
                source_hash: row.get("source_hash"),
                synthesis_draft_ids,
                merged_text: row.get("merged_text"),
                completed_at: super::jobs::parse_timestamp(row.get("completed_at"))?,
            }))
        }
        None => Ok(None),
    }
}

/// Load final segments for (project, job), in document order
pub async fn load_final_segments(
    pool: &SqlitePool,
    project_id: Uuid,
    job_id: Uuid,
) -> EngineResult<Vec<FinalSegment>> {
    let rows = sqlx::query(
        r#"
        SELECT segment_index, segment_id, text, rationale, chosen_run_order
        FROM final_segments
        WHERE project_id = ? AND job_id = ?
        ORDER BY segment_index
        "#,
    )
    .bind(project_id.to_string())
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| FinalSegment {
            segment_id: row.get("segment_id"),
            segment_index: row.get::<i64, _>("segment_index") as usize,
            text: row.get("text"),
            rationale: row.get("rationale"),
            chosen_run_order: row.get("chosen_run_order"),
        })
        .collect())
}
