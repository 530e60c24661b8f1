//! Draft fan-out / synthesis fan-in pipeline tests

mod common;

use std::sync::Arc;
use tokio::sync::RwLock;
use verso_engine::db;
use verso_engine::models::{DraftStatus, JobStatus, RunStatus};
use verso_engine::workflow::{cancellation, draft_pipeline};

const ORIGIN: &str = "Erster Absatz.\n\nZweiter Absatz.\n\nDritter Absatz.";

#[tokio::test]
async fn two_drafts_synthesize_into_final_translation() {
    let (_dir, state, translator) = common::setup().await;
    let project = common::seed_project(&state.db).await;

    let spec = common::drafts_spec(ORIGIN, &["model-a", "model-b"]);
    let (run, job) = common::start_and_claim(&state, project.project_id, spec.clone()).await;

    draft_pipeline::run_draft_job(&state, &job, &spec, &drafts_of(&spec))
        .await
        .unwrap();

    // Both drafts succeeded
    let drafts = db::drafts::load_job_drafts(&state.db, job.job_id).await.unwrap();
    assert_eq!(drafts.len(), 2);
    assert!(drafts.iter().all(|d| d.status == DraftStatus::Succeeded));
    assert!(drafts.iter().all(|d| d.segments.as_ref().unwrap().len() == 3));

    // Synthesis ran exactly once
    assert_eq!(translator.select_count(), 1);

    // Final translation covers every segment and names both drafts
    let final_translation =
        db::finals::get_final_translation(&state.db, project.project_id, job.job_id)
            .await
            .unwrap()
            .expect("final translation persisted");
    assert!(final_translation.is_final);
    assert_eq!(final_translation.variant, "final");
    assert_eq!(final_translation.synthesis_draft_ids.len(), 2);

    let segments = db::finals::load_final_segments(&state.db, project.project_id, job.job_id)
        .await
        .unwrap();
    assert_eq!(segments.len(), 3);
    // Scripted arbiter picks the lowest run_order candidate
    assert!(segments.iter().all(|s| s.chosen_run_order == Some(0)));
    assert!(segments.iter().all(|s| s.text.starts_with("model-a|")));
    // Document order preserved
    for (i, segment) in segments.iter().enumerate() {
        assert_eq!(segment.segment_index, i);
    }

    // Job and run are terminal-success
    let job = db::jobs::get_job(&state.db, job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.synthesis_queued);

    let run = db::workflow_runs::get_run(&state.db, run.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.metadata["segments"], 3);
}

#[tokio::test]
async fn one_failing_draft_still_synthesizes() {
    let translator = Arc::new(common::ScriptedTranslator::failing_models(&["model-b"]));
    let (_dir, state) = common::setup_with(translator.clone()).await;
    let project = common::seed_project(&state.db).await;

    let spec = common::drafts_spec(ORIGIN, &["model-a", "model-b"]);
    let (_run, job) = common::start_and_claim(&state, project.project_id, spec.clone()).await;

    draft_pipeline::run_draft_job(&state, &job, &spec, &drafts_of(&spec))
        .await
        .unwrap();

    let drafts = db::drafts::load_job_drafts(&state.db, job.job_id).await.unwrap();
    assert_eq!(
        drafts.iter().filter(|d| d.status == DraftStatus::Succeeded).count(),
        1
    );
    assert_eq!(
        drafts.iter().filter(|d| d.status == DraftStatus::Failed).count(),
        1
    );

    // Any success is enough for synthesis
    assert_eq!(translator.select_count(), 1);
    let final_translation =
        db::finals::get_final_translation(&state.db, project.project_id, job.job_id)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(final_translation.synthesis_draft_ids.len(), 1);

    let job = db::jobs::get_job(&state.db, job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
}

#[tokio::test]
async fn all_drafts_failing_fails_job_without_synthesis() {
    let translator = Arc::new(common::ScriptedTranslator::failing_models(&[
        "model-a", "model-b",
    ]));
    let (_dir, state) = common::setup_with(translator.clone()).await;
    let project = common::seed_project(&state.db).await;

    let spec = common::drafts_spec(ORIGIN, &["model-a", "model-b"]);
    let (run, job) = common::start_and_claim(&state, project.project_id, spec.clone()).await;

    draft_pipeline::run_draft_job(&state, &job, &spec, &drafts_of(&spec))
        .await
        .unwrap();

    assert_eq!(translator.select_count(), 0);
    assert!(
        db::finals::get_final_translation(&state.db, project.project_id, job.job_id)
            .await
            .unwrap()
            .is_none()
    );

    let job = db::jobs::get_job(&state.db, job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("All drafts failed"));

    let run = db::workflow_runs::get_run(&state.db, run.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn cancel_mid_flight_discards_results_and_skips_synthesis() {
    let gate = Arc::new(RwLock::new(()));
    let held = gate.clone().write_owned().await;

    let translator = Arc::new(common::ScriptedTranslator::gated(gate));
    let (_dir, state) = common::setup_with(translator.clone()).await;
    let project = common::seed_project(&state.db).await;

    let spec = common::drafts_spec(ORIGIN, &["model-a", "model-b"]);
    let (run, job) = common::start_and_claim(&state, project.project_id, spec.clone()).await;

    let pipeline_state = state.clone();
    let pipeline_job = job.clone();
    let pipeline_spec = spec.clone();
    let pipeline = tokio::spawn(async move {
        draft_pipeline::run_draft_job(
            &pipeline_state,
            &pipeline_job,
            &pipeline_spec,
            &drafts_of(&pipeline_spec),
        )
        .await
    });

    // Let the draft tasks reach the model call, then cancel under them
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancellation::cancel_translation(&state, job.job_id, "user cancel")
        .await
        .unwrap();

    drop(held);
    pipeline.await.unwrap().unwrap();

    // No synthesis, no final translation
    assert_eq!(translator.select_count(), 0);
    assert!(
        db::finals::get_final_translation(&state.db, project.project_id, job.job_id)
            .await
            .unwrap()
            .is_none()
    );

    // Everything terminal-cancelled; completed model calls were discarded
    let job = db::jobs::get_job(&state.db, job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    let drafts = db::drafts::load_job_drafts(&state.db, job.job_id).await.unwrap();
    assert!(drafts.iter().all(|d| d.status == DraftStatus::Cancelled));

    let run = db::workflow_runs::get_run(&state.db, run.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn cancel_leaves_already_succeeded_drafts_untouched() {
    let gate = Arc::new(RwLock::new(()));
    let held = gate.clone().write_owned().await;

    // Only model-b blocks; model-a settles immediately
    let translator = Arc::new(common::ScriptedTranslator::gated_models(gate, &["model-b"]));
    let (_dir, state) = common::setup_with(translator.clone()).await;
    let project = common::seed_project(&state.db).await;

    let spec = common::drafts_spec(ORIGIN, &["model-a", "model-b"]);
    let (_run, job) = common::start_and_claim(&state, project.project_id, spec.clone()).await;

    let pipeline_state = state.clone();
    let pipeline_job = job.clone();
    let pipeline_spec = spec.clone();
    let pipeline = tokio::spawn(async move {
        draft_pipeline::run_draft_job(
            &pipeline_state,
            &pipeline_job,
            &pipeline_spec,
            &drafts_of(&pipeline_spec),
        )
        .await
    });

    // Wait until the fast draft has settled succeeded
    let mut settled = false;
    for _ in 0..100 {
        let drafts = db::drafts::load_job_drafts(&state.db, job.job_id).await.unwrap();
        if drafts.iter().any(|d| d.status == DraftStatus::Succeeded) {
            settled = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(settled, "fast draft should settle before the cancel");

    cancellation::cancel_translation(&state, job.job_id, "user cancel")
        .await
        .unwrap();

    drop(held);
    pipeline.await.unwrap().unwrap();

    // The settled draft keeps its result; only the in-flight one is cancelled
    let drafts = db::drafts::load_job_drafts(&state.db, job.job_id).await.unwrap();
    assert_eq!(drafts[0].status, DraftStatus::Succeeded);
    assert!(drafts[0].segments.is_some());
    assert_eq!(drafts[1].status, DraftStatus::Cancelled);

    // And the cancel still suppresses synthesis
    assert_eq!(translator.select_count(), 0);
    let job = db::jobs::get_job(&state.db, job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn late_cancel_does_not_rewrite_a_succeeded_run() {
    let (_dir, state, translator) = common::setup().await;
    let project = common::seed_project(&state.db).await;

    let spec = common::drafts_spec(ORIGIN, &["model-a"]);
    let (run, job) = common::start_and_claim(&state, project.project_id, spec.clone()).await;

    draft_pipeline::run_draft_job(&state, &job, &spec, &drafts_of(&spec))
        .await
        .unwrap();
    assert_eq!(translator.select_count(), 1);

    // Cancel arriving after completion: the explicit cancel still wins on
    // the job, but the run's recorded outcome stands
    cancellation::cancel_translation(&state, job.job_id, "too late")
        .await
        .unwrap();

    let job = db::jobs::get_job(&state.db, job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    let run = db::workflow_runs::get_run(&state.db, run.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run.metadata.get("cancel_reason").is_none());
}

#[tokio::test]
async fn settled_fan_in_is_idempotent() {
    let (_dir, state, translator) = common::setup().await;
    let project = common::seed_project(&state.db).await;

    let spec = common::drafts_spec(ORIGIN, &["model-a"]);
    let (_run, job) = common::start_and_claim(&state, project.project_id, spec.clone()).await;

    draft_pipeline::run_draft_job(&state, &job, &spec, &drafts_of(&spec))
        .await
        .unwrap();
    assert_eq!(translator.select_count(), 1);

    // A redundant fan-in check after completion changes nothing: the
    // synthesis claim is already taken
    draft_pipeline::settle_fan_in(&state, &job).await.unwrap();
    assert_eq!(translator.select_count(), 1);

    let job = db::jobs::get_job(&state.db, job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
}

fn drafts_of(spec: &verso_engine::models::TranslateJobSpec) -> Vec<verso_engine::models::DraftConfig> {
    match &spec.pipeline {
        verso_engine::models::PipelineMode::Drafts { configs } => configs.clone(),
        _ => panic!("expected drafts pipeline"),
    }
}
