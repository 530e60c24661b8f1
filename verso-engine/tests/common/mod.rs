//! Shared test fixtures: temp-file database, scripted model service, and
//! seed data helpers

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::RwLock;
use uuid::Uuid;
use verso_common::events::EventBus;
use verso_engine::db;
use verso_engine::error::{EngineError, EngineResult};
use verso_engine::models::{
    DraftConfig, Job, PipelineMode, Project, SegmentationMode, TranslateJobSpec,
};
use verso_engine::services::{
    SelectBestRequest, SelectBestResponse, SelectedSegment, TranslateRequest, TranslateResponse,
    TranslationModelService,
};
use verso_engine::{EngineConfig, EngineState};

/// Deterministic scripted model service.
///
/// Draft calls (no stage) prefix the echo with the model name so synthesis
/// candidates are distinguishable; stage calls echo the input text verbatim
/// so guard checks see stable output. `select_best` picks the candidate with
/// the lowest run_order.
pub struct ScriptedTranslator {
    /// Models whose translate calls fail
    pub fail_models: HashSet<String>,
    /// Stages whose translate calls fail
    pub fail_stages: HashSet<String>,
    /// When set, translate blocks until the test drops its write lock
    pub gate: Option<Arc<RwLock<()>>>,
    /// Restricts the gate to these models; empty means all models block
    pub gate_models: HashSet<String>,
    pub translate_calls: AtomicUsize,
    pub select_calls: AtomicUsize,
}

impl ScriptedTranslator {
    pub fn new() -> Self {
        Self {
            fail_models: HashSet::new(),
            fail_stages: HashSet::new(),
            gate: None,
            gate_models: HashSet::new(),
            translate_calls: AtomicUsize::new(0),
            select_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_models(models: &[&str]) -> Self {
        let mut t = Self::new();
        t.fail_models = models.iter().map(|m| m.to_string()).collect();
        t
    }

    pub fn failing_stages(stages: &[&str]) -> Self {
        let mut t = Self::new();
        t.fail_stages = stages.iter().map(|s| s.to_string()).collect();
        t
    }

    pub fn gated(gate: Arc<RwLock<()>>) -> Self {
        let mut t = Self::new();
        t.gate = Some(gate);
        t
    }

    /// Gate only the named models; others respond immediately
    pub fn gated_models(gate: Arc<RwLock<()>>, models: &[&str]) -> Self {
        let mut t = Self::gated(gate);
        t.gate_models = models.iter().map(|m| m.to_string()).collect();
        t
    }

    pub fn translate_count(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn select_count(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationModelService for ScriptedTranslator {
    async fn translate(&self, request: TranslateRequest) -> EngineResult<TranslateResponse> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if self.gate_models.is_empty() || self.gate_models.contains(&request.model) {
                let _held = gate.read().await;
            }
        }

        if self.fail_models.contains(&request.model) {
            return Err(EngineError::Model(format!(
                "scripted failure for model {}",
                request.model
            )));
        }
        if let Some(stage) = &request.stage {
            if self.fail_stages.contains(stage) {
                return Err(EngineError::Model(format!(
                    "scripted failure for stage {}",
                    stage
                )));
            }
        }

        let segments: Vec<verso_engine::models::TranslatedSegment> = request
            .items
            .iter()
            .map(|item| {
                let text = if request.stage.is_some() {
                    item.segment.text.clone()
                } else {
                    format!("{}|{}", request.model, item.segment.text)
                };
                verso_engine::models::TranslatedSegment {
                    segment_id: item.segment.id.clone(),
                    order: item.segment.order,
                    text,
                }
            })
            .collect();

        let merged_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(TranslateResponse {
            segments,
            merged_text,
            usage: verso_engine::models::Usage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            },
            model: request.model,
        })
    }

    async fn select_best(&self, request: SelectBestRequest) -> EngineResult<SelectBestResponse> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);

        let segments: Vec<SelectedSegment> = request
            .groups
            .iter()
            .map(|group| {
                let winner = group
                    .candidates
                    .iter()
                    .min_by_key(|(run_order, _)| *run_order);
                let (run_order, text) = match winner {
                    Some((ro, t)) => (Some(*ro), t.clone()),
                    None => (None, group.origin_text.clone()),
                };
                SelectedSegment {
                    segment_id: group.segment_id.clone(),
                    segment_index: group.segment_index,
                    text,
                    rationale: Some("lowest run order".to_string()),
                    chosen_run_order: run_order,
                }
            })
            .collect();

        let merged_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(SelectBestResponse {
            segments,
            merged_text,
            usage: verso_engine::models::Usage::default(),
        })
    }
}

/// Fresh temp-file database plus engine state wired to the given translator.
/// The TempDir must stay alive for the test's duration.
pub async fn setup_with(translator: Arc<ScriptedTranslator>) -> (TempDir, EngineState) {
    let dir = TempDir::new().expect("create temp dir");
    let db_path = dir.path().join("verso-test.db");
    let pool = db::init_database(&db_path).await.expect("init database");

    let state = EngineState::new(
        pool,
        EventBus::new(64),
        translator,
        EngineConfig::default(),
    );

    (dir, state)
}

pub async fn setup() -> (TempDir, EngineState, Arc<ScriptedTranslator>) {
    let translator = Arc::new(ScriptedTranslator::new());
    let (dir, state) = setup_with(translator.clone()).await;
    (dir, state, translator)
}

/// Insert an active project
pub async fn seed_project(pool: &SqlitePool) -> Project {
    let project = db::projects::new_project("Testroman", "de", "en");
    db::projects::save_project(pool, &project)
        .await
        .expect("save project");
    project
}

pub fn drafts_spec(origin_text: &str, models: &[&str]) -> TranslateJobSpec {
    TranslateJobSpec {
        origin_text: origin_text.to_string(),
        segmentation_mode: SegmentationMode::Paragraph,
        origin_lang: "de".to_string(),
        target_lang: "en".to_string(),
        notes: None,
        batch_size: 2,
        pipeline: PipelineMode::Drafts {
            configs: models
                .iter()
                .map(|m| DraftConfig {
                    model: m.to_string(),
                    temperature: 0.7,
                    top_p: 1.0,
                })
                .collect(),
        },
    }
}

pub fn stages_spec(origin_text: &str, stages: &[&str], batch_size: usize) -> TranslateJobSpec {
    TranslateJobSpec {
        origin_text: origin_text.to_string(),
        segmentation_mode: SegmentationMode::Paragraph,
        origin_lang: "de".to_string(),
        target_lang: "en".to_string(),
        notes: None,
        batch_size,
        pipeline: PipelineMode::Stages {
            stages: stages.iter().map(|s| s.to_string()).collect(),
        },
    }
}

/// Start a translation through the engine facade and return the claimed job
pub async fn start_and_claim(
    state: &EngineState,
    project_id: Uuid,
    spec: TranslateJobSpec,
) -> (verso_engine::models::WorkflowRun, Job) {
    let request = verso_engine::models::ActionRequest::new(
        project_id,
        verso_engine::models::WorkflowType::Translation,
        Uuid::new_v4(),
    );

    let outcome = verso_engine::start_translation(state, request, spec)
        .await
        .expect("start translation");

    let (run, job_id) = match outcome {
        verso_engine::StartOutcome::Started { run, job_id } => (run, job_id),
        other => panic!("expected started outcome, got {:?}", other),
    };

    assert!(
        db::jobs::mark_running(&state.db, job_id)
            .await
            .expect("claim job"),
        "job should be claimable"
    );

    let job = db::jobs::get_job(&state.db, job_id)
        .await
        .expect("get job")
        .expect("job exists");

    (run, job)
}
