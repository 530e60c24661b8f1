//! Database initialization and schema
//!
//! SQLite via sqlx with WAL journaling and a busy timeout, so multiple
//! worker loops can share the pool as their only coordination point.
//! All table creation is idempotent (`CREATE TABLE IF NOT EXISTS`).

pub mod drafts;
pub mod finals;
pub mod jobs;
pub mod projects;
pub mod stage_segments;
pub mod workflow_runs;

use crate::error::EngineResult;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> EngineResult<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(verso_common::Error::Io)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; the worker pool and
    // draft tasks all write through this pool
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all engine tables (idempotent, safe to call on every startup)
pub async fn create_schema(pool: &SqlitePool) -> EngineResult<()> {
    create_projects_table(pool).await?;
    create_jobs_table(pool).await?;
    create_workflow_runs_table(pool).await?;
    create_workflow_state_table(pool).await?;
    create_drafts_table(pool).await?;
    create_final_translations_table(pool).await?;
    create_final_segments_table(pool).await?;
    create_stage_segments_table(pool).await?;
    create_stage_outputs_table(pool).await?;
    Ok(())
}

async fn create_projects_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            project_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            origin_lang TEXT NOT NULL,
            target_lang TEXT NOT NULL,
            memory TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            project_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            workflow_run_id TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            synthesis_queued INTEGER NOT NULL DEFAULT 0,
            payload TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_status_type ON jobs(status, job_type, created_at)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_workflow_runs_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_runs (
            run_id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            workflow_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            requested_by TEXT NOT NULL,
            label TEXT,
            parent_run_id TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            sequence INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runs_project_type ON workflow_runs(project_id, workflow_type, started_at)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_workflow_state_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_state (
            project_id TEXT NOT NULL,
            workflow_type TEXT NOT NULL,
            current_run_id TEXT NOT NULL,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (project_id, workflow_type)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_drafts_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drafts (
            draft_id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            run_order INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            model TEXT NOT NULL,
            temperature REAL NOT NULL,
            top_p REAL NOT NULL,
            segments TEXT,
            merged_text TEXT,
            usage TEXT,
            error TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_drafts_job ON drafts(job_id, run_order)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_final_translations_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS final_translations (
            project_id TEXT NOT NULL,
            job_id TEXT NOT NULL,
            variant TEXT NOT NULL DEFAULT 'final',
            is_final INTEGER NOT NULL DEFAULT 1,
            source_hash TEXT NOT NULL,
            synthesis_draft_ids TEXT NOT NULL DEFAULT '[]',
            merged_text TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            PRIMARY KEY (project_id, job_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_final_segments_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS final_segments (
            project_id TEXT NOT NULL,
            job_id TEXT NOT NULL,
            variant TEXT NOT NULL DEFAULT 'final',
            segment_index INTEGER NOT NULL,
            segment_id TEXT NOT NULL,
            text TEXT NOT NULL,
            rationale TEXT,
            chosen_run_order INTEGER,
            PRIMARY KEY (project_id, job_id, variant, segment_index)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_stage_segments_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_segments (
            job_id TEXT NOT NULL,
            segment_id TEXT NOT NULL,
            segment_index INTEGER NOT NULL,
            text_source TEXT NOT NULL,
            prev_ctx TEXT,
            next_ctx TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            findings TEXT,
            PRIMARY KEY (job_id, segment_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_stage_outputs_table(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_outputs (
            job_id TEXT NOT NULL,
            segment_id TEXT NOT NULL,
            stage TEXT NOT NULL,
            output TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (job_id, segment_id, stage)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
