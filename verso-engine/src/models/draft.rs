//! Draft pass types
//!
//! One `DraftRecord` per parallel full-document translation pass. A draft is
//! mutated only by the worker processing it and never reverts from a
//! terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Draft status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Queued => "queued",
            DraftStatus::Running => "running",
            DraftStatus::Succeeded => "succeeded",
            DraftStatus::Failed => "failed",
            DraftStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(DraftStatus::Queued),
            "running" => Some(DraftStatus::Running),
            "succeeded" => Some(DraftStatus::Succeeded),
            "failed" => Some(DraftStatus::Failed),
            "cancelled" => Some(DraftStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DraftStatus::Succeeded | DraftStatus::Failed | DraftStatus::Cancelled
        )
    }
}

/// Model/parameter configuration for one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftConfig {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
}

/// One translated segment as returned by the model service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    /// Origin segment id this translation belongs to
    pub segment_id: String,
    /// Position in the document (matches the origin segment order)
    pub order: usize,
    pub text: String,
}

/// Token usage reported by the model service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One parallel translation pass over the full segment set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRecord {
    pub draft_id: Uuid,
    pub job_id: Uuid,
    pub project_id: Uuid,
    /// 0-based ordinal; tie-break rank for synthesis candidates
    pub run_order: i64,
    pub status: DraftStatus,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    /// Translated segments (populated on success)
    pub segments: Option<Vec<TranslatedSegment>>,
    pub merged_text: Option<String>,
    pub usage: Option<Usage>,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_status_roundtrip() {
        for s in [
            DraftStatus::Queued,
            DraftStatus::Running,
            DraftStatus::Succeeded,
            DraftStatus::Failed,
            DraftStatus::Cancelled,
        ] {
            assert_eq!(DraftStatus::parse(s.as_str()), Some(s));
        }
    }
}
