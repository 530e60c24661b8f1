//! Project database operations

use crate::error::{EngineError, EngineResult};
use crate::models::{Project, ProjectStatus};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert or replace a project
pub async fn save_project(pool: &SqlitePool, project: &Project) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO projects (project_id, name, status, origin_lang, target_lang, memory, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(project_id) DO UPDATE SET
            name = excluded.name,
            status = excluded.status,
            origin_lang = excluded.origin_lang,
            target_lang = excluded.target_lang,
            memory = excluded.memory
        "#,
    )
    .bind(project.project_id.to_string())
    .bind(&project.name)
    .bind(project.status.as_str())
    .bind(&project.origin_lang)
    .bind(&project.target_lang)
    .bind(&project.memory)
    .bind(project.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a project by id
pub async fn get_project(pool: &SqlitePool, project_id: Uuid) -> EngineResult<Option<Project>> {
    let row = sqlx::query(
        r#"
        SELECT project_id, name, status, origin_lang, target_lang, memory, created_at
        FROM projects
        WHERE project_id = ?
        "#,
    )
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let status_str: String = row.get("status");
            let status = ProjectStatus::parse(&status_str).ok_or_else(|| {
                EngineError::Internal(format!("Unknown project status: {}", status_str))
            })?;

            Ok(Some(Project {
                project_id,
                name: row.get("name"),
                status,
                origin_lang: row.get("origin_lang"),
                target_lang: row.get("target_lang"),
                memory: row.get("memory"),
                created_at: super::jobs::parse_timestamp(row.get("created_at"))?,
            }))
        }
        None => Ok(None),
    }
}

/// Update a project's lifecycle status
pub async fn set_project_status(
    pool: &SqlitePool,
    project_id: Uuid,
    status: ProjectStatus,
) -> EngineResult<()> {
    sqlx::query("UPDATE projects SET status = ? WHERE project_id = ?")
        .bind(status.as_str())
        .bind(project_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Convenience constructor for a new active project
pub fn new_project(name: &str, origin_lang: &str, target_lang: &str) -> Project {
    Project {
        project_id: Uuid::new_v4(),
        name: name.to_string(),
        status: ProjectStatus::Active,
        origin_lang: origin_lang.to_string(),
        target_lang: target_lang.to_string(),
        memory: None,
        created_at: Utc::now(),
    }
}
