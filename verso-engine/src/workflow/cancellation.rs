//! Cancellation coordinator
//!
//! Cancellation is cooperative: this function establishes the durable
//! "cancelled" facts in order, and in-flight workers observe them at their
//! own checkpoints. The job transition comes first so any checkpoint hit
//! during the cascade already sees the cancel. Units already in a terminal
//! state are left untouched; the job status itself is the one exception and
//! flips to cancelled from any state.

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::Job;
use crate::workflow::coordinator;
use crate::EngineState;
use uuid::Uuid;

/// Cancel a translate job and everything under it.
///
/// Idempotent: cancelling an already-cancelled job repeats the guarded
/// updates, all of which no-op. Returns the job in its post-cancel state.
pub async fn cancel_translation(
    state: &EngineState,
    job_id: Uuid,
    reason: &str,
) -> EngineResult<Job> {
    let Some(job) = db::jobs::get_job(&state.db, job_id).await? else {
        return Err(EngineError::Common(verso_common::Error::NotFound(format!(
            "Job {} not found",
            job_id
        ))));
    };

    tracing::info!(job_id = %job_id, reason, "Cancelling translation job");

    // 1. Ledger first: every subsequent checkpoint poll observes the cancel
    db::jobs::mark_cancelled(&state.db, job_id, Some(reason)).await?;

    // 2. Settle in-flight drafts; settled ones keep their terminal state
    let drafts = db::drafts::cancel_job_drafts(&state.db, job_id, reason).await?;

    // 3. Stage rows still pending; done/needs_review rows keep their state
    let segments = db::stage_segments::cancel_job_segments(&state.db, job_id).await?;

    // 4. Owning run last, so the run's terminal state never precedes the
    // job's
    if let Some(run_id) = job.workflow_run_id {
        coordinator::cancel_action(&state.db, &state.event_bus, run_id, reason).await?;
    }

    tracing::info!(
        job_id = %job_id,
        drafts_cancelled = drafts,
        segments_cancelled = segments,
        "Cancellation cascade complete"
    );

    db::jobs::get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| EngineError::Internal(format!("Job {} vanished during cancel", job_id)))
}
