//! Workflow run and workflow state database operations
//!
//! The workflow_state row for a (project, type) pair is the fast-path guard
//! consulted before accepting a new run. Terminal updates only touch it when
//! `current_run_id` still matches the finishing run, so a stale pointer from
//! a superseded run never clobbers a newer run's state.

use crate::error::{EngineError, EngineResult};
use crate::models::{RunStatus, WorkflowRun, WorkflowState, WorkflowType};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert a new run and point workflow_state at it (both writes issued
/// together; per-row atomicity is all the state machine requires)
pub async fn insert_run(pool: &SqlitePool, run: &WorkflowRun) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO workflow_runs (
            run_id, project_id, workflow_type, status, requested_by, label,
            parent_run_id, metadata, sequence, started_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run.run_id.to_string())
    .bind(run.project_id.to_string())
    .bind(run.workflow_type.as_str())
    .bind(run.status.as_str())
    .bind(run.requested_by.to_string())
    .bind(&run.label)
    .bind(run.parent_run_id.map(|id| id.to_string()))
    .bind(serde_json::to_string(&run.metadata)?)
    .bind(run.sequence)
    .bind(run.started_at.to_rfc3339())
    .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO workflow_state (project_id, workflow_type, current_run_id, status, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(project_id, workflow_type) DO UPDATE SET
            current_run_id = excluded.current_run_id,
            status = excluded.status,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(run.project_id.to_string())
    .bind(run.workflow_type.as_str())
    .bind(run.run_id.to_string())
    .bind(run.status.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a run by id
pub async fn get_run(pool: &SqlitePool, run_id: Uuid) -> EngineResult<Option<WorkflowRun>> {
    let row = sqlx::query(
        r#"
        SELECT run_id, project_id, workflow_type, status, requested_by, label,
               parent_run_id, metadata, sequence, started_at, completed_at
        FROM workflow_runs
        WHERE run_id = ?
        "#,
    )
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(run_from_row).transpose()
}

/// List runs for a project, most recent first
pub async fn list_runs(
    pool: &SqlitePool,
    project_id: Uuid,
    workflow_type: Option<WorkflowType>,
) -> EngineResult<Vec<WorkflowRun>> {
    let rows = match workflow_type {
        Some(wt) => {
            sqlx::query(
                r#"
                SELECT run_id, project_id, workflow_type, status, requested_by, label,
                       parent_run_id, metadata, sequence, started_at, completed_at
                FROM workflow_runs
                WHERE project_id = ? AND workflow_type = ?
                ORDER BY started_at DESC
                "#,
            )
            .bind(project_id.to_string())
            .bind(wt.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT run_id, project_id, workflow_type, status, requested_by, label,
                       parent_run_id, metadata, sequence, started_at, completed_at
                FROM workflow_runs
                WHERE project_id = ?
                ORDER BY started_at DESC
                "#,
            )
            .bind(project_id.to_string())
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter().map(run_from_row).collect()
}

/// Most recent translation run for a project (default parent for
/// proofread/quality runs)
pub async fn latest_translation_run(
    pool: &SqlitePool,
    project_id: Uuid,
) -> EngineResult<Option<WorkflowRun>> {
    let row = sqlx::query(
        r#"
        SELECT run_id, project_id, workflow_type, status, requested_by, label,
               parent_run_id, metadata, sequence, started_at, completed_at
        FROM workflow_runs
        WHERE project_id = ? AND workflow_type = 'translation'
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(run_from_row).transpose()
}

/// Count prior runs for (project, type); the next sequence is count + 1
pub async fn next_sequence(
    pool: &SqlitePool,
    project_id: Uuid,
    workflow_type: WorkflowType,
) -> EngineResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM workflow_runs WHERE project_id = ? AND workflow_type = ?",
    )
    .bind(project_id.to_string())
    .bind(workflow_type.as_str())
    .fetch_one(pool)
    .await?;

    Ok(count + 1)
}

/// Load the workflow state pointer for (project, type)
pub async fn get_state(
    pool: &SqlitePool,
    project_id: Uuid,
    workflow_type: WorkflowType,
) -> EngineResult<Option<WorkflowState>> {
    let row = sqlx::query(
        r#"
        SELECT project_id, workflow_type, current_run_id, status, updated_at
        FROM workflow_state
        WHERE project_id = ? AND workflow_type = ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(workflow_type.as_str())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let current_run_id_str: String = row.get("current_run_id");
            let current_run_id = Uuid::parse_str(&current_run_id_str).map_err(|e| {
                EngineError::Internal(format!("Failed to parse current_run_id: {}", e))
            })?;

            let status_str: String = row.get("status");
            let status = RunStatus::parse(&status_str).ok_or_else(|| {
                EngineError::Internal(format!("Unknown run status: {}", status_str))
            })?;

            Ok(Some(WorkflowState {
                project_id,
                workflow_type,
                current_run_id,
                status,
                updated_at: super::jobs::parse_timestamp(row.get("updated_at"))?,
            }))
        }
        None => Ok(None),
    }
}

/// Terminal transition for one run: stamp completed_at, merge metadata,
/// and update the state pointer only if it still points at this run.
///
/// Guarded on `status = 'running'`: a run that already reached a terminal
/// state is never re-terminalized (a cancel arriving after success must not
/// rewrite the run's outcome). Returns None when no transition happened.
pub async fn finish_run(
    pool: &SqlitePool,
    run_id: Uuid,
    status: RunStatus,
    metadata: Option<serde_json::Value>,
) -> EngineResult<Option<WorkflowRun>> {
    debug_assert!(status.is_terminal());

    let Some(run) = get_run(pool, run_id).await? else {
        return Ok(None);
    };

    // Merge incoming metadata over the stored object
    let mut merged = run.metadata.clone();
    if let Some(extra) = metadata {
        if let (Some(base), Some(add)) = (merged.as_object_mut(), extra.as_object()) {
            for (k, v) in add {
                base.insert(k.clone(), v.clone());
            }
        } else {
            merged = extra;
        }
    }

    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE workflow_runs
        SET status = ?, metadata = ?, completed_at = COALESCE(completed_at, ?)
        WHERE run_id = ? AND status = 'running'
        "#,
    )
    .bind(status.as_str())
    .bind(serde_json::to_string(&merged)?)
    .bind(&now)
    .bind(run_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Already terminal: leave the run and the state pointer untouched
        return Ok(None);
    }

    // Stale-pointer guard: a superseded run must not clobber a newer run
    sqlx::query(
        r#"
        UPDATE workflow_state
        SET status = ?, updated_at = ?
        WHERE project_id = ? AND workflow_type = ? AND current_run_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(&now)
    .bind(run.project_id.to_string())
    .bind(run.workflow_type.as_str())
    .bind(run_id.to_string())
    .execute(pool)
    .await?;

    get_run(pool, run_id).await
}

/// Ids of every running run for a project
pub async fn list_running_run_ids(pool: &SqlitePool, project_id: Uuid) -> EngineResult<Vec<Uuid>> {
    let rows = sqlx::query(
        "SELECT run_id FROM workflow_runs WHERE project_id = ? AND status = 'running'",
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let run_id_str: String = row.get("run_id");
            Uuid::parse_str(&run_id_str)
                .map_err(|e| EngineError::Internal(format!("Failed to parse run_id: {}", e)))
        })
        .collect()
}

/// Cancel runs left `running` by a previous process (startup cleanup)
pub async fn cleanup_stale_runs(pool: &SqlitePool) -> EngineResult<usize> {
    let running = sqlx::query("SELECT run_id FROM workflow_runs WHERE status = 'running'")
        .fetch_all(pool)
        .await?;

    let mut cancelled = 0;
    for row in running {
        let run_id_str: String = row.get("run_id");
        let run_id = Uuid::parse_str(&run_id_str)
            .map_err(|e| EngineError::Internal(format!("Failed to parse run_id: {}", e)))?;

        finish_run(
            pool,
            run_id,
            RunStatus::Cancelled,
            Some(serde_json::json!({ "cancel_reason": "engine restarted" })),
        )
        .await?;
        cancelled += 1;
    }

    Ok(cancelled)
}

fn run_from_row(row: sqlx::sqlite::SqliteRow) -> EngineResult<WorkflowRun> {
    let run_id_str: String = row.get("run_id");
    let run_id = Uuid::parse_str(&run_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse run_id: {}", e)))?;

    let project_id_str: String = row.get("project_id");
    let project_id = Uuid::parse_str(&project_id_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse project_id: {}", e)))?;

    let type_str: String = row.get("workflow_type");
    let workflow_type = WorkflowType::parse(&type_str)
        .ok_or_else(|| EngineError::Internal(format!("Unknown workflow type: {}", type_str)))?;

    let status_str: String = row.get("status");
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| EngineError::Internal(format!("Unknown run status: {}", status_str)))?;

    let requested_by_str: String = row.get("requested_by");
    let requested_by = Uuid::parse_str(&requested_by_str)
        .map_err(|e| EngineError::Internal(format!("Failed to parse requested_by: {}", e)))?;

    let parent_run_id: Option<String> = row.get("parent_run_id");
    let parent_run_id = parent_run_id
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| EngineError::Internal(format!("Failed to parse parent_run_id: {}", e)))?;

    let metadata_text: String = row.get("metadata");
    let metadata: serde_json::Value = serde_json::from_str(&metadata_text)?;

    Ok(WorkflowRun {
        run_id,
        project_id,
        workflow_type,
        status,
        requested_by,
        label: row.get("label"),
        parent_run_id,
        metadata,
        sequence: row.get("sequence"),
        started_at: super::jobs::parse_timestamp(row.get("started_at"))?,
        completed_at: super::jobs::parse_optional_timestamp(row.get("completed_at"))?,
    })
}
