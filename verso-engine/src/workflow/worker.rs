//! Translate job workers
//!
//! N independent poll loops claim `translate` jobs from the ledger and drive
//! the matching pipeline. Claiming goes through the ledger's conditional
//! queued-to-running transition, so two workers polling the same job resolve
//! to exactly one owner. Other job types (analyze, profile, cover) are
//! executed by external collaborators polling the same ledger and are never
//! claimed here.

use crate::db;
use crate::error::EngineResult;
use crate::models::{Job, JobType, PipelineMode};
use crate::workflow::{coordinator, draft_pipeline, stage_pipeline};
use crate::EngineState;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn the configured number of worker loops
pub fn spawn_workers(state: EngineState) -> Vec<JoinHandle<()>> {
    let count = state.config.worker_count.max(1);
    tracing::info!(workers = count, "Spawning translate workers");

    (0..count)
        .map(|worker_id| {
            let state = state.clone();
            tokio::spawn(async move {
                worker_loop(state, worker_id).await;
            })
        })
        .collect()
}

/// One worker: claim, execute, repeat. Sleeps between empty polls.
async fn worker_loop(state: EngineState, worker_id: usize) {
    let poll_interval = Duration::from_millis(state.config.poll_interval_ms);
    tracing::debug!(worker_id, "Worker started");

    loop {
        match db::jobs::claim_next_queued(&state.db, JobType::Translate).await {
            Ok(Some(job)) => {
                tracing::info!(worker_id, job_id = %job.job_id, "Worker claimed job");
                if let Err(e) = execute_job(&state, &job).await {
                    tracing::error!(worker_id, job_id = %job.job_id, error = %e, "Job execution error");
                }
            }
            Ok(None) => {
                tokio::time::sleep(poll_interval).await;
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Worker poll failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

/// Dispatch one claimed translate job to its pipeline.
///
/// Every failure path resolves the job (and its owning run) to a terminal
/// state before the error propagates; a claimed job is never left `running`
/// by a returning worker.
pub async fn execute_job(state: &EngineState, job: &Job) -> EngineResult<()> {
    let spec = match job.translate_spec() {
        Ok(spec) => spec,
        Err(e) => {
            let reason = format!("Malformed translate payload: {}", e);
            db::jobs::mark_failed(&state.db, job.job_id, &reason).await?;
            if let Some(run_id) = job.workflow_run_id {
                coordinator::fail_action(
                    &state.db,
                    &state.event_bus,
                    run_id,
                    Some(serde_json::json!({ "error": reason })),
                )
                .await?;
            }
            return Err(e.into());
        }
    };

    match &spec.pipeline {
        PipelineMode::Drafts { configs } => {
            draft_pipeline::run_draft_job(state, job, &spec, configs).await
        }
        PipelineMode::Stages { stages } => {
            stage_pipeline::run_stage_job(state, job, &spec, stages).await
        }
    }
}
