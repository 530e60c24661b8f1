//! Sequential stage pipeline
//!
//! A stages-mode translate job runs an ordered chain of named passes
//! ("literal", "style", "emotion", "qa", ...) over segment batches. Stage N+1
//! consumes stage N's recorded output. Outputs accumulate additively, so a
//! retried job skips segments a previous attempt already covered, and job
//! progress is derived from the output rows rather than stored as a pointer.
//! The terminal stage runs guard checks and flags failing segments for human
//! review instead of failing the job.

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{BatchItem, Job, StageSegment, StageSegmentStatus, TranslateJobSpec};
use crate::segmentation;
use crate::services::TranslateRequest;
use crate::workflow::draft_pipeline::fail_run;
use crate::workflow::{coordinator, guards};
use crate::EngineState;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;
use verso_common::events::VersoEvent;

/// Execute a stages-mode translate job to completion.
///
/// Cancellation is polled before every batch's model call and again before
/// persisting its outputs; on cancel the function simply stops, leaving
/// terminal row states to the cancellation path.
pub async fn run_stage_job(
    state: &EngineState,
    job: &Job,
    spec: &TranslateJobSpec,
    stages: &[String],
) -> EngineResult<()> {
    if stages.is_empty() {
        let reason = "Stages pipeline requires at least one stage";
        db::jobs::mark_failed(&state.db, job.job_id, reason).await?;
        fail_run(state, job, reason).await?;
        return Err(EngineError::Internal(reason.to_string()));
    }

    let segmentation = match segmentation::segment(
        &spec.origin_text,
        job.project_id,
        spec.segmentation_mode,
    ) {
        Ok(result) => result,
        Err(e) => {
            db::jobs::mark_failed(&state.db, job.job_id, &e.to_string()).await?;
            fail_run(state, job, &e.to_string()).await?;
            return Err(e);
        }
    };

    let batches = segmentation::batch(&segmentation.segments, spec.batch_size);
    let all_items: Vec<BatchItem> = batches.iter().flatten().cloned().collect();

    db::stage_segments::create_stage_segments(&state.db, job.job_id, &all_items).await?;

    let memory = db::projects::get_project(&state.db, job.project_id)
        .await?
        .and_then(|p| p.memory);

    let notes = compose_notes(spec.notes.as_deref(), memory.as_deref());

    tracing::info!(
        job_id = %job.job_id,
        stages = ?stages,
        segments = all_items.len(),
        batches = batches.len(),
        "Stage pipeline started"
    );

    let terminal_stage = stages.len() - 1;

    for (stage_index, stage) in stages.iter().enumerate() {
        // Prior stage's outputs feed this one; first stage reads origin text
        let prior_outputs = if stage_index > 0 {
            db::stage_segments::load_stage_outputs(&state.db, job.job_id, &stages[stage_index - 1])
                .await?
        } else {
            HashMap::new()
        };

        // Outputs this stage already has (retried job); extended as batches
        // complete so the terminal-stage guard loop sees fresh results
        let mut stage_outputs =
            db::stage_segments::load_stage_outputs(&state.db, job.job_id, stage).await?;

        // Reference for entity consistency: first stage output, when the
        // terminal stage is a distinct later pass
        let first_outputs = if stage_index == terminal_stage && stage_index > 0 {
            db::stage_segments::load_stage_outputs(&state.db, job.job_id, &stages[0]).await?
        } else {
            HashMap::new()
        };

        for (batch_index, batch) in batches.iter().enumerate() {
            if db::jobs::is_cancelled(&state.db, job.job_id).await? {
                tracing::info!(job_id = %job.job_id, stage = %stage, "Stage pipeline stopping: job cancelled");
                return Ok(());
            }

            let pending: Vec<&BatchItem> = batch
                .iter()
                .filter(|item| !stage_outputs.contains_key(&item.segment.id))
                .collect();

            if !pending.is_empty() {
                let items: Vec<BatchItem> = pending
                    .iter()
                    .map(|item| rewrite_item(item, stage_index, &prior_outputs))
                    .collect();

                let request = TranslateRequest {
                    items,
                    origin_lang: spec.origin_lang.clone(),
                    target_lang: spec.target_lang.clone(),
                    notes: notes.clone(),
                    stage: Some(stage.clone()),
                    model: state.config.stage_model.clone(),
                    temperature: state.config.stage_temperature,
                    top_p: state.config.stage_top_p,
                };

                let response = match state.translator.translate(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        let reason = format!("Stage '{}' batch {} failed: {}", stage, batch_index, e);
                        db::jobs::mark_failed(&state.db, job.job_id, &reason).await?;
                        fail_run(state, job, &reason).await?;
                        return Ok(());
                    }
                };

                if db::jobs::is_cancelled(&state.db, job.job_id).await? {
                    // Batch completed after cancel: discard
                    return Ok(());
                }

                for segment in &response.segments {
                    db::stage_segments::record_stage_output(
                        &state.db,
                        job.job_id,
                        &segment.segment_id,
                        stage,
                        &segment.text,
                    )
                    .await?;
                    stage_outputs.insert(segment.segment_id.clone(), segment.text.clone());
                }
            }

            if stage_index == terminal_stage {
                finish_batch(state, job, batch, &stage_outputs, &first_outputs, memory.as_deref())
                    .await?;
            }

            let _ = state.event_bus.emit(VersoEvent::StageBatchComplete {
                job_id: job.job_id,
                stage: stage.clone(),
                batch_index,
                total_batches: batches.len(),
                timestamp: Utc::now(),
            });
        }
    }

    let flagged = db::stage_segments::load_job_segments(&state.db, job.job_id)
        .await?
        .iter()
        .filter(|s| s.status == StageSegmentStatus::NeedsReview)
        .count();

    db::jobs::mark_succeeded(&state.db, job.job_id).await?;

    if let Some(run_id) = job.workflow_run_id {
        coordinator::complete_action(
            &state.db,
            &state.event_bus,
            run_id,
            Some(serde_json::json!({
                "segments": all_items.len(),
                "stages": stages,
                "flagged": flagged,
                "source_hash": segmentation.source_hash,
            })),
        )
        .await?;
    }

    tracing::info!(
        job_id = %job.job_id,
        segments = all_items.len(),
        flagged,
        "Stage pipeline complete"
    );

    Ok(())
}

/// Guard-check and finish every segment of a terminal-stage batch
async fn finish_batch(
    state: &EngineState,
    job: &Job,
    batch: &[BatchItem],
    stage_outputs: &HashMap<String, String>,
    first_outputs: &HashMap<String, String>,
    memory: Option<&str>,
) -> EngineResult<()> {
    for item in batch {
        let Some(output) = stage_outputs.get(&item.segment.id) else {
            // Model response omitted this segment: a guard cannot vouch for
            // text that does not exist
            let finding = crate::models::GuardFinding {
                guard: "coverage".to_string(),
                message: "Terminal stage produced no output for this segment".to_string(),
            };
            db::stage_segments::finish_segment(
                &state.db,
                job.job_id,
                &item.segment.id,
                StageSegmentStatus::NeedsReview,
                &[finding.clone()],
            )
            .await?;
            emit_flagged(state, job.job_id, &item.segment.id, &[finding]);
            continue;
        };

        let findings = guards::evaluate(
            &item.segment.text,
            first_outputs.get(&item.segment.id).map(String::as_str),
            output,
            memory,
        );

        if findings.is_empty() {
            db::stage_segments::finish_segment(
                &state.db,
                job.job_id,
                &item.segment.id,
                StageSegmentStatus::Done,
                &[],
            )
            .await?;
        } else {
            tracing::warn!(
                job_id = %job.job_id,
                segment_id = %item.segment.id,
                guards = ?findings.iter().map(|f| f.guard.as_str()).collect::<Vec<_>>(),
                "Segment flagged for review"
            );
            db::stage_segments::finish_segment(
                &state.db,
                job.job_id,
                &item.segment.id,
                StageSegmentStatus::NeedsReview,
                &findings,
            )
            .await?;
            emit_flagged(state, job.job_id, &item.segment.id, &findings);
        }
    }

    Ok(())
}

/// Stage N>0 translates the prior stage's output; contexts stay origin-side
fn rewrite_item(
    item: &BatchItem,
    stage_index: usize,
    prior_outputs: &HashMap<String, String>,
) -> BatchItem {
    if stage_index == 0 {
        return item.clone();
    }

    let mut rewritten = item.clone();
    if let Some(prior) = prior_outputs.get(&item.segment.id) {
        rewritten.segment.text = prior.clone();
    }
    rewritten
}

fn compose_notes(notes: Option<&str>, memory: Option<&str>) -> Option<String> {
    match (notes, memory) {
        (Some(n), Some(m)) => Some(format!("{}\n\nProject memory:\n{}", n, m)),
        (Some(n), None) => Some(n.to_string()),
        (None, Some(m)) => Some(format!("Project memory:\n{}", m)),
        (None, None) => None,
    }
}

fn emit_flagged(
    state: &EngineState,
    job_id: Uuid,
    segment_id: &str,
    findings: &[crate::models::GuardFinding],
) {
    let _ = state.event_bus.emit(VersoEvent::SegmentFlagged {
        job_id,
        segment_id: segment_id.to_string(),
        guards: findings.iter().map(|f| f.guard.clone()).collect(),
        timestamp: Utc::now(),
    });
}

/// Derive the stage a job is currently working through: the first stage in
/// order whose recorded outputs do not yet cover every segment. None once
/// all stages are complete.
pub async fn current_stage(
    pool: &SqlitePool,
    job_id: Uuid,
    stages: &[String],
) -> EngineResult<Option<String>> {
    let total = db::stage_segments::count_segments(pool, job_id).await?;

    for stage in stages {
        let done = db::stage_segments::count_stage_outputs(pool, job_id, stage).await?;
        if done < total {
            return Ok(Some(stage.clone()));
        }
    }

    Ok(None)
}

/// Read-side summary of guard outcomes for a job
#[derive(Debug, Clone)]
pub struct GuardSummary {
    pub total_segments: usize,
    /// Segments flagged for review, in document order
    pub flagged: Vec<StageSegment>,
    /// Failure count per guard name
    pub counts: HashMap<String, usize>,
}

/// Summarize guard findings across a job's segments
pub async fn guard_summary(pool: &SqlitePool, job_id: Uuid) -> EngineResult<GuardSummary> {
    let segments = db::stage_segments::load_job_segments(pool, job_id).await?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut flagged = Vec::new();

    for segment in segments.iter() {
        if segment.status == StageSegmentStatus::NeedsReview {
            for finding in &segment.findings {
                *counts.entry(finding.guard.clone()).or_insert(0) += 1;
            }
            flagged.push(segment.clone());
        }
    }

    Ok(GuardSummary {
        total_segments: segments.len(),
        flagged,
        counts,
    })
}
