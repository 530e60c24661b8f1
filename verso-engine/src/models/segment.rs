//! Segmentation, batching, final-translation and stage-pipeline types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deterministic segmentation mode. Participates in the source hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationMode {
    /// Blank-line separated paragraphs (manuscript default)
    Paragraph,
    /// Terminal-punctuation split within paragraphs
    Sentence,
}

impl SegmentationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMode::Paragraph => "paragraph",
            SegmentationMode::Sentence => "sentence",
        }
    }
}

/// One origin segment. Immutable once segmentation completes for a hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginSegment {
    /// Stable id derived from the source hash and order
    pub id: String,
    pub text: String,
    /// Paragraph this segment came from (equals `order` in paragraph mode)
    pub paragraph_index: usize,
    /// Document position, 0-based
    pub order: usize,
}

/// Result of segmenting one origin text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationResult {
    /// Content hash of normalized text + project + mode; the pipeline
    /// identity and idempotency key
    pub source_hash: String,
    pub segments: Vec<OriginSegment>,
    pub mode: SegmentationMode,
}

/// One element of a batch, carrying adjacent-segment context so a pass can
/// resolve cross-segment pronoun/context issues without the whole document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub segment: OriginSegment,
    /// Raw text of the immediately preceding segment, if any
    pub prev_ctx: Option<String>,
    /// Raw text of the immediately following segment, if any
    pub next_ctx: Option<String>,
}

/// One segment of the synthesized final translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalSegment {
    pub segment_id: String,
    pub segment_index: usize,
    pub text: String,
    /// Model rationale for the selection/merge
    pub rationale: Option<String>,
    /// run_order of the draft whose candidate was chosen
    pub chosen_run_order: Option<i64>,
}

/// Synthesized final translation, upserted once per (project, job)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalTranslation {
    pub project_id: Uuid,
    pub job_id: Uuid,
    pub variant: String,
    pub is_final: bool,
    pub source_hash: String,
    /// Drafts that fed synthesis
    pub synthesis_draft_ids: Vec<Uuid>,
    pub merged_text: String,
    pub completed_at: DateTime<Utc>,
}

/// Stage-pipeline segment row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSegmentStatus {
    /// Not all stages have written output yet
    Pending,
    /// Every stage wrote output and guards passed
    Done,
    /// Terminal-stage guard flagged this segment for a human
    NeedsReview,
    /// Cancelled before completion
    Cancelled,
}

impl StageSegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageSegmentStatus::Pending => "pending",
            StageSegmentStatus::Done => "done",
            StageSegmentStatus::NeedsReview => "needs_review",
            StageSegmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageSegmentStatus::Pending),
            "done" => Some(StageSegmentStatus::Done),
            "needs_review" => Some(StageSegmentStatus::NeedsReview),
            "cancelled" => Some(StageSegmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal rows are never overwritten by a late cancellation
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageSegmentStatus::Done | StageSegmentStatus::NeedsReview)
    }
}

/// One segment travelling through the sequential stage pipeline. Stage
/// outputs live in their own additive table keyed by (job, segment, stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSegment {
    pub job_id: Uuid,
    pub segment_id: String,
    pub segment_index: usize,
    pub text_source: String,
    pub prev_ctx: Option<String>,
    pub next_ctx: Option<String>,
    pub status: StageSegmentStatus,
    /// Structured guard findings, populated when flagged
    pub findings: Vec<GuardFinding>,
}

/// One structured guard failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardFinding {
    /// Guard name ("term_map", "entity_consistency", "length_parity")
    pub guard: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_segment_status_roundtrip() {
        for s in [
            StageSegmentStatus::Pending,
            StageSegmentStatus::Done,
            StageSegmentStatus::NeedsReview,
            StageSegmentStatus::Cancelled,
        ] {
            assert_eq!(StageSegmentStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn needs_review_is_terminal_for_cancellation() {
        assert!(StageSegmentStatus::Done.is_terminal());
        assert!(StageSegmentStatus::NeedsReview.is_terminal());
        assert!(!StageSegmentStatus::Pending.is_terminal());
        assert!(!StageSegmentStatus::Cancelled.is_terminal());
    }
}
