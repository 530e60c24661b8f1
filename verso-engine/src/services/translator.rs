//! Translation Model Service interface
//!
//! The engine consumes the model service as a black box: a full-document
//! (or batch) translate call, and a per-segment candidate arbitration call
//! used by synthesis. Calls are suspension points at which cancellation may
//! have been observed by another actor; both are treated as job-failing on
//! error, subject to the caller's own retry policy.

use crate::error::EngineResult;
use crate::models::{BatchItem, TranslatedSegment, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One translate invocation: the full segment list of one pass, or one batch
/// of the sequential pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateRequest {
    /// Segments in document order, each with adjacent-segment context
    pub items: Vec<BatchItem>,
    pub origin_lang: String,
    pub target_lang: String,
    /// Translation notes plus shared project memory, if any
    pub notes: Option<String>,
    /// Stage name for sequential-pipeline calls ("literal", "style", ...)
    pub stage: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
}

/// Translate result: one output per input segment, in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub segments: Vec<TranslatedSegment>,
    pub merged_text: String,
    pub usage: Usage,
    pub model: String,
}

/// All candidates for one segment, grouped for arbitration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateGroup {
    pub segment_id: String,
    pub segment_index: usize,
    pub origin_text: String,
    /// (draft run_order, candidate text); rank by run_order when candidates
    /// are otherwise equal, never by draft finish time
    pub candidates: Vec<(i64, String)>,
}

/// Synthesis invocation: every segment's candidate group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectBestRequest {
    pub groups: Vec<CandidateGroup>,
    pub origin_lang: String,
    pub target_lang: String,
    pub notes: Option<String>,
}

/// One arbitrated segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedSegment {
    pub segment_id: String,
    pub segment_index: usize,
    pub text: String,
    pub rationale: Option<String>,
    /// run_order of the winning candidate's draft
    pub chosen_run_order: Option<i64>,
}

/// Synthesis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectBestResponse {
    pub segments: Vec<SelectedSegment>,
    pub merged_text: String,
    pub usage: Usage,
}

/// Black-box translation model service
#[async_trait]
pub trait TranslationModelService: Send + Sync {
    /// Translate a segment list. Within one call, output order matches
    /// input order.
    async fn translate(&self, request: TranslateRequest) -> EngineResult<TranslateResponse>;

    /// Reconcile per-segment candidates into one final text per segment.
    async fn select_best(&self, request: SelectBestRequest) -> EngineResult<SelectBestResponse>;
}
