//! Workflow run and singleton-state types
//!
//! A `WorkflowRun` is one execution instance of a workflow type for a
//! project. `WorkflowState` is the per-(project, type) singleton pointer
//! consulted as the fast-path guard before accepting a new run; it mirrors
//! the latest run and is updated alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named workflow type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Translation,
    Proofread,
    Quality,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Translation => "translation",
            WorkflowType::Proofread => "proofread",
            WorkflowType::Quality => "quality",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "translation" => Some(WorkflowType::Translation),
            "proofread" => Some(WorkflowType::Proofread),
            "quality" => Some(WorkflowType::Quality),
            _ => None,
        }
    }
}

/// Run status: `running` then exactly one terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// One invocation of a workflow type for a project. Retained indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub workflow_type: WorkflowType,
    pub status: RunStatus,
    pub requested_by: Uuid,
    pub label: Option<String>,
    /// Links proofread/quality runs to the translation run they act on
    pub parent_run_id: Option<Uuid>,
    /// Opaque key/value metadata, merged on completion/failure/cancel
    pub metadata: serde_json::Value,
    /// Ordinal per (project, type); display ordering, not concurrency control
    pub sequence: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Singleton pointer per (project, type), mirroring the latest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub project_id: Uuid,
    pub workflow_type: WorkflowType,
    pub current_run_id: Uuid,
    pub status: RunStatus,
    pub updated_at: DateTime<Utc>,
}

/// Request to start a workflow run
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub project_id: Uuid,
    pub workflow_type: WorkflowType,
    pub requested_by: Uuid,
    pub label: Option<String>,
    pub parent_run_id: Option<Uuid>,
    /// Opt-in to concurrent runs of the same type (default false)
    pub allow_parallel: bool,
}

impl ActionRequest {
    pub fn new(project_id: Uuid, workflow_type: WorkflowType, requested_by: Uuid) -> Self {
        Self {
            project_id,
            workflow_type,
            requested_by,
            label: None,
            parent_run_id: None,
            allow_parallel: false,
        }
    }
}

/// Why a workflow request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Project is archived or deleted
    ProjectInactive,
    /// Another run of this type is active and `allow_parallel` was false
    AlreadyRunning,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::ProjectInactive => "project_inactive",
            RejectionReason::AlreadyRunning => "already_running",
        }
    }
}

/// Outcome of `request_action`
#[derive(Debug, Clone)]
pub enum ActionDecision {
    /// Run inserted and active; workflow state points at it
    Accepted(WorkflowRun),
    /// No state mutated. `conflict_run` is populated for `AlreadyRunning`
    /// so the caller can offer "view current run" instead of retrying.
    Rejected {
        reason: RejectionReason,
        conflict_run: Option<WorkflowRun>,
    },
}

impl ActionDecision {
    pub fn accepted(&self) -> Option<&WorkflowRun> {
        match self {
            ActionDecision::Accepted(run) => Some(run),
            ActionDecision::Rejected { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_roundtrip() {
        for s in [
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(RunStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }
}
