//! Data model for the translation workflow engine

mod draft;
mod job;
mod project;
mod segment;
mod workflow;

pub use draft::{DraftConfig, DraftRecord, DraftStatus, TranslatedSegment, Usage};
pub use job::{Job, JobStatus, JobType, PipelineMode, TranslateJobSpec};
pub use project::{Project, ProjectStatus};
pub use segment::{
    BatchItem, FinalSegment, FinalTranslation, GuardFinding, OriginSegment, SegmentationMode,
    SegmentationResult, StageSegment, StageSegmentStatus,
};
pub use workflow::{
    ActionDecision, ActionRequest, RejectionReason, RunStatus, WorkflowRun, WorkflowState,
    WorkflowType,
};
