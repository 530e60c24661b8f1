//! Job ledger types
//!
//! One `Job` row per asynchronous unit of work. Rows are created on enqueue,
//! mutated only by the worker owning the unit, and never deleted (the ledger
//! is the audit trail).

use crate::models::{DraftConfig, SegmentationMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asynchronous unit-of-work type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// Document analysis (executed by an external collaborator)
    Analyze,
    /// Translation pipeline (drafts/synthesis or sequential stages)
    Translate,
    /// Document profile / literary analysis (external)
    Profile,
    /// Cover image generation (external)
    Cover,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Analyze => "analyze",
            JobType::Translate => "translate",
            JobType::Profile => "profile",
            JobType::Cover => "cover",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analyze" => Some(JobType::Analyze),
            "translate" => Some(JobType::Translate),
            "profile" => Some(JobType::Profile),
            "cover" => Some(JobType::Cover),
            _ => None,
        }
    }
}

/// Job status lifecycle
///
/// Transitions are monotonic except for explicit cancellation, which may
/// override any state at any time (a user cancel always wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions except explicit cancel
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// One ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub project_id: Uuid,
    pub user_id: Uuid,
    /// Owning workflow run, if the job was started through the coordinator
    pub workflow_run_id: Option<Uuid>,
    /// Times a worker has claimed this job (diagnostics only)
    pub attempts: i64,
    pub last_error: Option<String>,
    /// Fan-in claim flag: set exactly once by the draft that queues synthesis
    pub synthesis_queued: bool,
    /// Job-type specific request payload (JSON)
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Decode the translate payload carried by a `translate` job
    pub fn translate_spec(&self) -> Result<TranslateJobSpec, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Which pipeline a translate job runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PipelineMode {
    /// N independent full-document passes, reconciled by synthesis
    Drafts {
        /// One entry per parallel pass (model/temperature/top_p)
        configs: Vec<DraftConfig>,
    },
    /// Ordered chain of named stages over segment batches
    Stages {
        /// Stage names, executed in order (last one runs guard checks)
        stages: Vec<String>,
    },
}

/// Request payload for a translate job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateJobSpec {
    /// Origin text to translate (pre-normalization)
    pub origin_text: String,
    /// Segmentation mode
    pub segmentation_mode: SegmentationMode,
    pub origin_lang: String,
    pub target_lang: String,
    /// Free-form translation notes forwarded to the model service
    #[serde(default)]
    pub notes: Option<String>,
    /// Segments per batch for the sequential pipeline
    pub batch_size: usize,
    pub pipeline: PipelineMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn pipeline_mode_serializes_with_tag() {
        let mode = PipelineMode::Stages {
            stages: vec!["literal".to_string(), "qa".to_string()],
        };
        let json = serde_json::to_string(&mode).unwrap();
        assert!(json.contains("\"mode\":\"stages\""));
    }
}
