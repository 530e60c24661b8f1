//! Parallel draft fan-out and synthesis fan-in
//!
//! A drafts-mode translate job fans out N independent full-document passes,
//! then reconciles them segment-by-segment with one synthesis call. The
//! fan-in trigger is the draft that settles last: after settling, every
//! draft task re-checks the remaining open count, and the one that observes
//! zero claims synthesis through the ledger's one-shot flag. Synthesis runs
//! when at least one draft succeeded; requiring all of them would let a
//! single flaky pass waste the others.

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    DraftConfig, DraftRecord, DraftStatus, FinalSegment, FinalTranslation, Job, TranslateJobSpec,
};
use crate::segmentation;
use crate::services::{CandidateGroup, SelectBestRequest, TranslateRequest};
use crate::workflow::coordinator;
use crate::EngineState;
use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;
use verso_common::events::VersoEvent;

/// Execute a drafts-mode translate job to completion.
///
/// Returns after every draft task has settled and fan-in has run. The job's
/// terminal status is written by the fan-in path (or by cancellation), never
/// by this function's return value alone.
pub async fn run_draft_job(
    state: &EngineState,
    job: &Job,
    spec: &TranslateJobSpec,
    configs: &[DraftConfig],
) -> EngineResult<()> {
    if configs.is_empty() {
        let reason = "Drafts pipeline requires at least one draft config";
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

    // Every draft translates the full segment set in one call
    let items: Vec<_> = segmentation::batch(&segmentation.segments, segmentation.segments.len())
        .into_iter()
        .flatten()
        .collect();

    let drafts = db::drafts::create_drafts(&state.db, job.job_id, job.project_id, configs).await?;

    tracing::info!(
        job_id = %job.job_id,
        drafts = drafts.len(),
        segments = items.len(),
        "Draft fan-out started"
    );

    let mut tasks = JoinSet::new();
    for draft in drafts {
        let state = state.clone();
        let job = job.clone();
        let spec = spec.clone();
        let items = items.clone();

        tasks.spawn(async move {
            if let Err(e) = run_draft(&state, &job, &spec, draft, items).await {
                tracing::warn!(job_id = %job.job_id, error = %e, "Draft task error");
            }
            // Each settling draft re-checks the fan-in condition; exactly one
            // observes the last settle and claims synthesis
            if let Err(e) = settle_fan_in(&state, &job).await {
                tracing::error!(job_id = %job.job_id, error = %e, "Fan-in error");
                let _ = db::jobs::mark_failed(&state.db, job.job_id, &e.to_string()).await;
                let _ = fail_run(&state, &job, &e.to_string()).await;
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(job_id = %job.job_id, error = %e, "Draft task panicked");
        }
    }

    // Backstop for the panic path: every step of settle_fan_in is guarded, so
    // a redundant invocation is a no-op
    settle_fan_in(state, job).await?;

    Ok(())
}

/// Execute one draft pass: claim, translate, persist.
///
/// Cancellation is checked at the two checkpoints where abandoning work is
/// cheap and correct: before the model call, and again before persisting the
/// result (a pass that completed after cancel is discarded, not stored).
async fn run_draft(
    state: &EngineState,
    job: &Job,
    spec: &TranslateJobSpec,
    draft: DraftRecord,
    items: Vec<crate::models::BatchItem>,
) -> EngineResult<()> {
    if !db::drafts::mark_draft_running(&state.db, draft.draft_id).await? {
        // Already claimed, or cancelled before it ever started
        return Ok(());
    }

    if db::jobs::is_cancelled(&state.db, job.job_id).await? {
        db::drafts::mark_draft_cancelled(&state.db, draft.draft_id, "Job cancelled").await?;
        emit_settled(state, job.job_id, draft.run_order, DraftStatus::Cancelled);
        return Ok(());
    }

    let request = TranslateRequest {
        items,
        origin_lang: spec.origin_lang.clone(),
        target_lang: spec.target_lang.clone(),
        notes: spec.notes.clone(),
        stage: None,
        model: draft.model.clone(),
        temperature: draft.temperature,
        top_p: draft.top_p,
    };

    match state.translator.translate(request).await {
        Ok(response) => {
            if db::jobs::is_cancelled(&state.db, job.job_id).await? {
                // Completed after cancel: discard the result
                db::drafts::mark_draft_cancelled(
                    &state.db,
                    draft.draft_id,
                    "Job cancelled before persist",
                )
                .await?;
                emit_settled(state, job.job_id, draft.run_order, DraftStatus::Cancelled);
                return Ok(());
            }

            db::drafts::mark_draft_succeeded(
                &state.db,
                draft.draft_id,
                &response.segments,
                &response.merged_text,
                &response.usage,
            )
            .await?;
            tracing::info!(
                job_id = %job.job_id,
                draft_id = %draft.draft_id,
                run_order = draft.run_order,
                "Draft succeeded"
            );
            emit_settled(state, job.job_id, draft.run_order, DraftStatus::Succeeded);
        }
        Err(e) => {
            // Persist the failure first, then re-raise so the caller's
            // retry policy has the original error to act on
            db::drafts::mark_draft_failed(&state.db, draft.draft_id, &e.to_string()).await?;
            tracing::warn!(
                job_id = %job.job_id,
                draft_id = %draft.draft_id,
                run_order = draft.run_order,
                error = %e,
                "Draft failed"
            );
            emit_settled(state, job.job_id, draft.run_order, DraftStatus::Failed);
            return Err(e);
        }
    }

    Ok(())
}

/// Fan-in check, run by every settling draft.
///
/// No-op until the last draft settles. Then: zero successes fails the job
/// with the aggregated draft errors; otherwise the one-shot synthesis claim
/// decides which caller performs the fan-in, and the winner runs synthesis
/// inline.
pub async fn settle_fan_in(state: &EngineState, job: &Job) -> EngineResult<()> {
    if db::drafts::count_open_drafts(&state.db, job.job_id).await? > 0 {
        return Ok(());
    }

    if db::jobs::is_cancelled(&state.db, job.job_id).await? {
        // Cancellation already owns the job's terminal state
        return Ok(());
    }

    let drafts = db::drafts::load_job_drafts(&state.db, job.job_id).await?;
    let succeeded: Vec<&DraftRecord> = drafts
        .iter()
        .filter(|d| d.status == DraftStatus::Succeeded)
        .collect();

    if succeeded.is_empty() {
        let errors: Vec<String> = drafts
            .iter()
            .filter_map(|d| d.error.clone())
            .collect();
        let reason = format!("All drafts failed: {}", errors.join("; "));
        db::jobs::mark_failed(&state.db, job.job_id, &reason).await?;
        fail_run(state, job, &reason).await?;
        return Ok(());
    }

    if !db::jobs::claim_synthesis(&state.db, job.job_id).await? {
        // Another finishing draft won the claim
        return Ok(());
    }

    tracing::info!(
        job_id = %job.job_id,
        candidates = succeeded.len(),
        "Synthesis claimed"
    );
    let _ = state.event_bus.emit(VersoEvent::SynthesisQueued {
        job_id: job.job_id,
        candidate_count: succeeded.len(),
        timestamp: Utc::now(),
    });

    let spec = job.translate_spec()?;
    run_synthesis(state, job, &spec, &succeeded).await
}

/// Reconcile succeeded drafts into the final translation.
///
/// Candidate groups carry every draft's rendering of each segment, ranked by
/// run_order (never by finish time, which is nondeterministic). The result
/// is upserted, so a re-run for the same job replaces rather than duplicates.
async fn run_synthesis(
    state: &EngineState,
    job: &Job,
    spec: &TranslateJobSpec,
    succeeded: &[&DraftRecord],
) -> EngineResult<()> {
    if db::jobs::is_cancelled(&state.db, job.job_id).await? {
        return Ok(());
    }

    // Segmentation is deterministic, so recomputing reproduces the exact
    // segment ids the drafts translated
    let segmentation =
        segmentation::segment(&spec.origin_text, job.project_id, spec.segmentation_mode)?;

    let groups: Vec<CandidateGroup> = segmentation
        .segments
        .iter()
        .map(|origin| {
            let candidates = succeeded
                .iter()
                .filter_map(|draft| {
                    let segments = draft.segments.as_deref()?;
                    segments
                        .iter()
                        .find(|s| s.segment_id == origin.id)
                        .map(|s| (draft.run_order, s.text.clone()))
                })
                .collect();

            CandidateGroup {
                segment_id: origin.id.clone(),
                segment_index: origin.order,
                origin_text: origin.text.clone(),
                candidates,
            }
        })
        .collect();

    let request = SelectBestRequest {
        groups,
        origin_lang: spec.origin_lang.clone(),
        target_lang: spec.target_lang.clone(),
        notes: spec.notes.clone(),
    };

    let response = match state.translator.select_best(request).await {
        Ok(response) => response,
        Err(e) => {
            let reason = format!("Synthesis failed: {}", e);
            db::jobs::mark_failed(&state.db, job.job_id, &reason).await?;
            fail_run(state, job, &reason).await?;
            return Ok(());
        }
    };

    if db::jobs::is_cancelled(&state.db, job.job_id).await? {
        // Synthesis finished after cancel: discard
        return Ok(());
    }

    let segments: Vec<FinalSegment> = response
        .segments
        .iter()
        .map(|s| FinalSegment {
            segment_id: s.segment_id.clone(),
            segment_index: s.segment_index,
            text: s.text.clone(),
            rationale: s.rationale.clone(),
            chosen_run_order: s.chosen_run_order,
        })
        .collect();

    let synthesis_draft_ids: Vec<Uuid> = succeeded.iter().map(|d| d.draft_id).collect();

    let final_translation = FinalTranslation {
        project_id: job.project_id,
        job_id: job.job_id,
        variant: "final".to_string(),
        is_final: true,
        source_hash: segmentation.source_hash.clone(),
        synthesis_draft_ids,
        merged_text: response.merged_text.clone(),
        completed_at: Utc::now(),
    };

    db::finals::save_final_translation(&state.db, &final_translation, &segments).await?;
    db::jobs::mark_succeeded(&state.db, job.job_id).await?;

    if let Some(run_id) = job.workflow_run_id {
        coordinator::complete_action(
            &state.db,
            &state.event_bus,
            run_id,
            Some(serde_json::json!({
                "segments": segments.len(),
                "drafts": succeeded.len(),
                "source_hash": segmentation.source_hash,
            })),
        )
        .await?;
    }

    tracing::info!(
        job_id = %job.job_id,
        project_id = %job.project_id,
        segments = segments.len(),
        "Synthesis complete"
    );
    let _ = state.event_bus.emit(VersoEvent::SynthesisComplete {
        job_id: job.job_id,
        project_id: job.project_id,
        segment_count: segments.len(),
        timestamp: Utc::now(),
    });

    Ok(())
}

pub(crate) async fn fail_run(state: &EngineState, job: &Job, reason: &str) -> EngineResult<()> {
    if let Some(run_id) = job.workflow_run_id {
        coordinator::fail_action(
            &state.db,
            &state.event_bus,
            run_id,
            Some(serde_json::json!({ "error": reason })),
        )
        .await?;
    }
    Ok(())
}

fn emit_settled(state: &EngineState, job_id: Uuid, run_order: i64, status: DraftStatus) {
    let _ = state.event_bus.emit(VersoEvent::DraftSettled {
        job_id,
        run_order,
        status: status.as_str().to_string(),
        timestamp: Utc::now(),
    });
}
