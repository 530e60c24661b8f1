//! Verso translation engine
//!
//! Coordinates AI-assisted manuscript translation for a project workspace:
//! a durable job ledger, per-project workflow runs, deterministic
//! segmentation, a parallel draft + synthesis pipeline, a sequential stage
//! pipeline with guard checks, and cooperative cancellation. Persistence is
//! SQLite; progress is broadcast on the shared event bus.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod segmentation;
pub mod services;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};

use crate::models::{ActionDecision, ActionRequest, JobType, TranslateJobSpec, WorkflowRun};
use crate::services::TranslationModelService;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use verso_common::events::{EventBus, VersoEvent};

/// Shared engine state handed to workers and pipelines
#[derive(Clone)]
pub struct EngineState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub translator: Arc<dyn TranslationModelService>,
    pub config: EngineConfig,
}

impl EngineState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        translator: Arc<dyn TranslationModelService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            event_bus,
            translator,
            config,
        }
    }
}

/// Outcome of a translation start request
#[derive(Debug)]
pub enum StartOutcome {
    /// Run accepted and job enqueued; a worker will pick it up
    Started { run: WorkflowRun, job_id: Uuid },
    /// Nothing was written
    Rejected(ActionDecision),
}

/// Start a translation: validate segmentation, gate through the workflow
/// coordinator, and enqueue the translate job.
///
/// Segmentation is validated first so unusable origin text is rejected
/// before any run or job row exists. A coordinator rejection likewise leaves
/// the store untouched.
pub async fn start_translation(
    state: &EngineState,
    request: ActionRequest,
    spec: TranslateJobSpec,
) -> EngineResult<StartOutcome> {
    segmentation::segment(&spec.origin_text, request.project_id, spec.segmentation_mode)?;

    let project_id = request.project_id;
    let user_id = request.requested_by;

    let decision = workflow::coordinator::request_action(&state.db, &state.event_bus, request).await?;

    let run = match decision {
        ActionDecision::Accepted(run) => run,
        rejected => return Ok(StartOutcome::Rejected(rejected)),
    };

    let job_id = db::jobs::enqueue(
        &state.db,
        JobType::Translate,
        project_id,
        user_id,
        Some(run.run_id),
        serde_json::to_value(&spec)?,
    )
    .await?;

    let _ = state.event_bus.emit(VersoEvent::JobEnqueued {
        job_id,
        project_id,
        job_type: JobType::Translate.as_str().to_string(),
        timestamp: Utc::now(),
    });

    Ok(StartOutcome::Started { run, job_id })
}
