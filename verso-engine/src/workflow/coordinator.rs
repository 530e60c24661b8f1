//! Workflow run coordinator
//!
//! Serializes workflow execution per (project, type): a request is either
//! accepted (run inserted, state pointer updated) or rejected with a reason,
//! and a rejected request mutates nothing. Acceptance uses the workflow_state
//! singleton as the fast-path guard rather than scanning run history.

use crate::db;
use crate::error::EngineResult;
use crate::models::{
    ActionDecision, ActionRequest, RejectionReason, RunStatus, WorkflowRun, WorkflowType,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use verso_common::events::{EventBus, VersoEvent};

/// Decide whether a workflow may start for a project, and start it.
///
/// Checks run in order: project gate first (an inactive project rejects even
/// when no run is active), then the per-type singleton guard. On acceptance
/// the run row and the state pointer are written before returning, so a
/// concurrent second request observes the new run.
pub async fn request_action(
    pool: &SqlitePool,
    bus: &EventBus,
    request: ActionRequest,
) -> EngineResult<ActionDecision> {
    // Project gate: unknown and inactive projects reject identically
    let project = db::projects::get_project(pool, request.project_id).await?;
    let inactive = match &project {
        Some(p) => p.status.is_inactive(),
        None => true,
    };
    if inactive {
        tracing::info!(
            project_id = %request.project_id,
            workflow_type = request.workflow_type.as_str(),
            "Workflow request rejected: project inactive"
        );
        return Ok(ActionDecision::Rejected {
            reason: RejectionReason::ProjectInactive,
            conflict_run: None,
        });
    }

    // Singleton guard: one active run per (project, type) unless the caller
    // opted into parallel runs
    if !request.allow_parallel {
        let state =
            db::workflow_runs::get_state(pool, request.project_id, request.workflow_type).await?;
        if let Some(state) = state {
            if state.status == RunStatus::Running {
                let conflict_run =
                    db::workflow_runs::get_run(pool, state.current_run_id).await?;
                tracing::info!(
                    project_id = %request.project_id,
                    workflow_type = request.workflow_type.as_str(),
                    conflict_run_id = %state.current_run_id,
                    "Workflow request rejected: already running"
                );
                return Ok(ActionDecision::Rejected {
                    reason: RejectionReason::AlreadyRunning,
                    conflict_run,
                });
            }
        }
    }

    // Default parent: proofread/quality runs act on the latest translation
    let parent_run_id = match request.parent_run_id {
        Some(id) => Some(id),
        None if request.workflow_type != WorkflowType::Translation => {
            db::workflow_runs::latest_translation_run(pool, request.project_id)
                .await?
                .map(|run| run.run_id)
        }
        None => None,
    };

    let sequence =
        db::workflow_runs::next_sequence(pool, request.project_id, request.workflow_type).await?;

    let run = WorkflowRun {
        run_id: Uuid::new_v4(),
        project_id: request.project_id,
        workflow_type: request.workflow_type,
        status: RunStatus::Running,
        requested_by: request.requested_by,
        label: request.label,
        parent_run_id,
        metadata: serde_json::json!({}),
        sequence,
        started_at: Utc::now(),
        completed_at: None,
    };

    db::workflow_runs::insert_run(pool, &run).await?;

    tracing::info!(
        run_id = %run.run_id,
        project_id = %run.project_id,
        workflow_type = run.workflow_type.as_str(),
        sequence = run.sequence,
        "Workflow run started"
    );

    let _ = bus.emit(VersoEvent::RunStarted {
        run_id: run.run_id,
        project_id: run.project_id,
        workflow_type: run.workflow_type.as_str().to_string(),
        sequence: run.sequence,
        timestamp: run.started_at,
    });

    Ok(ActionDecision::Accepted(run))
}

/// Mark a run succeeded, merging result metadata
pub async fn complete_action(
    pool: &SqlitePool,
    bus: &EventBus,
    run_id: Uuid,
    metadata: Option<serde_json::Value>,
) -> EngineResult<Option<WorkflowRun>> {
    finish_action(pool, bus, run_id, RunStatus::Succeeded, metadata).await
}

/// Mark a run failed, merging error metadata
pub async fn fail_action(
    pool: &SqlitePool,
    bus: &EventBus,
    run_id: Uuid,
    metadata: Option<serde_json::Value>,
) -> EngineResult<Option<WorkflowRun>> {
    finish_action(pool, bus, run_id, RunStatus::Failed, metadata).await
}

/// Mark a run cancelled, recording the reason in metadata
pub async fn cancel_action(
    pool: &SqlitePool,
    bus: &EventBus,
    run_id: Uuid,
    reason: &str,
) -> EngineResult<Option<WorkflowRun>> {
    finish_action(
        pool,
        bus,
        run_id,
        RunStatus::Cancelled,
        Some(serde_json::json!({ "cancel_reason": reason })),
    )
    .await
}

async fn finish_action(
    pool: &SqlitePool,
    bus: &EventBus,
    run_id: Uuid,
    status: RunStatus,
    metadata: Option<serde_json::Value>,
) -> EngineResult<Option<WorkflowRun>> {
    let run = db::workflow_runs::finish_run(pool, run_id, status, metadata).await?;

    if let Some(run) = &run {
        tracing::info!(
            run_id = %run.run_id,
            project_id = %run.project_id,
            status = status.as_str(),
            "Workflow run finished"
        );
        let _ = bus.emit(VersoEvent::RunFinished {
            run_id: run.run_id,
            project_id: run.project_id,
            status: status.as_str().to_string(),
            timestamp: run.completed_at.unwrap_or_else(Utc::now),
        });
    }

    Ok(run)
}

/// Cancel every running run for a project (used when a project is archived
/// or deleted). Atomic per run; cross-run atomicity is not required.
pub async fn mark_project_runs_cancelled(
    pool: &SqlitePool,
    bus: &EventBus,
    project_id: Uuid,
    reason: &str,
) -> EngineResult<usize> {
    let run_ids = db::workflow_runs::list_running_run_ids(pool, project_id).await?;
    let count = run_ids.len();

    for run_id in run_ids {
        cancel_action(pool, bus, run_id, reason).await?;
    }

    if count > 0 {
        tracing::info!(project_id = %project_id, cancelled = count, reason, "Project runs cancelled");
    }

    Ok(count)
}
