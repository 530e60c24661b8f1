//! Project types
//!
//! The engine reads projects to gate workflow requests and to supply shared
//! project memory to stage workers. Project CRUD beyond that belongs to the
//! outer application layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Project lifecycle status. Archived and deleted projects accept no runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
    Deleted,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
            ProjectStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProjectStatus::Active),
            "archived" => Some(ProjectStatus::Archived),
            "deleted" => Some(ProjectStatus::Deleted),
            _ => None,
        }
    }

    /// Inactive projects reject workflow requests immediately
    pub fn is_inactive(&self) -> bool {
        !matches!(self, ProjectStatus::Active)
    }
}

/// One manuscript project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub origin_lang: String,
    pub target_lang: String,
    /// Shared project memory consumed by stage workers: glossary lines
    /// (`source=target`), style notes, named-entity decisions
    pub memory: Option<String>,
    pub created_at: DateTime<Utc>,
}
