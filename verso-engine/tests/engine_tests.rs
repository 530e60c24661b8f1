//! Engine facade tests: start_translation gating and enqueue

mod common;

use uuid::Uuid;
use verso_engine::db;
use verso_engine::models::{
    ActionDecision, ActionRequest, JobStatus, JobType, RejectionReason, WorkflowType,
};
use verso_engine::{start_translation, EngineError, StartOutcome};

#[tokio::test]
async fn empty_origin_text_is_rejected_before_any_write() {
    let (_dir, state, _) = common::setup().await;
    let project = common::seed_project(&state.db).await;

    let request = ActionRequest::new(project.project_id, WorkflowType::Translation, Uuid::new_v4());
    let result = start_translation(&state, request, common::drafts_spec("  \n\n  ", &["m"])).await;

    assert!(matches!(result, Err(EngineError::Segmentation(_))));

    // No run, no job
    let runs = db::workflow_runs::list_runs(&state.db, project.project_id, None)
        .await
        .unwrap();
    assert!(runs.is_empty());
    assert!(db::jobs::claim_next_queued(&state.db, JobType::Translate)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn accepted_request_enqueues_job_linked_to_run() {
    let (_dir, state, _) = common::setup().await;
    let project = common::seed_project(&state.db).await;

    let request = ActionRequest::new(project.project_id, WorkflowType::Translation, Uuid::new_v4());
    let outcome = start_translation(
        &state,
        request,
        common::drafts_spec("Ein Absatz.", &["model-a"]),
    )
    .await
    .unwrap();

    let StartOutcome::Started { run, job_id } = outcome else {
        panic!("expected started outcome");
    };

    let job = db::jobs::get_job(&state.db, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.job_type, JobType::Translate);
    assert_eq!(job.workflow_run_id, Some(run.run_id));
    assert_eq!(job.project_id, project.project_id);

    // Payload round-trips into the pipeline spec
    let spec = job.translate_spec().unwrap();
    assert_eq!(spec.origin_text, "Ein Absatz.");
}

#[tokio::test]
async fn second_start_is_rejected_while_first_runs() {
    let (_dir, state, _) = common::setup().await;
    let project = common::seed_project(&state.db).await;

    let request = ActionRequest::new(project.project_id, WorkflowType::Translation, Uuid::new_v4());
    let first = start_translation(&state, request, common::drafts_spec("Text.", &["m"]))
        .await
        .unwrap();
    assert!(matches!(first, StartOutcome::Started { .. }));

    let request = ActionRequest::new(project.project_id, WorkflowType::Translation, Uuid::new_v4());
    let second = start_translation(&state, request, common::drafts_spec("Text.", &["m"]))
        .await
        .unwrap();

    match second {
        StartOutcome::Rejected(ActionDecision::Rejected { reason, .. }) => {
            assert_eq!(reason, RejectionReason::AlreadyRunning);
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    // Only the first job exists
    let claimed = db::jobs::claim_next_queued(&state.db, JobType::Translate)
        .await
        .unwrap();
    assert!(claimed.is_some());
    assert!(db::jobs::claim_next_queued(&state.db, JobType::Translate)
        .await
        .unwrap()
        .is_none());
}
