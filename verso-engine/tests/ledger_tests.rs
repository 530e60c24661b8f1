//! Job ledger transition guard tests

mod common;

use verso_engine::db;
use verso_engine::models::{JobStatus, JobType};

async fn enqueue_translate(state: &verso_engine::EngineState) -> uuid::Uuid {
    let project = common::seed_project(&state.db).await;
    db::jobs::enqueue(
        &state.db,
        JobType::Translate,
        project.project_id,
        uuid::Uuid::new_v4(),
        None,
        serde_json::json!({}),
    )
    .await
    .expect("enqueue")
}

#[tokio::test]
async fn mark_running_claims_exactly_once() {
    let (_dir, state, _) = common::setup().await;
    let job_id = enqueue_translate(&state).await;

    assert!(db::jobs::mark_running(&state.db, job_id).await.unwrap());
    // Second claim is a no-op: the job is no longer queued
    assert!(!db::jobs::mark_running(&state.db, job_id).await.unwrap());

    let job = db::jobs::get_job(&state.db, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.attempts, 1);
    assert!(job.started_at.is_some());
}

#[tokio::test]
async fn cancel_wins_over_late_success() {
    let (_dir, state, _) = common::setup().await;
    let job_id = enqueue_translate(&state).await;

    db::jobs::mark_running(&state.db, job_id).await.unwrap();
    db::jobs::mark_cancelled(&state.db, job_id, Some("user cancel"))
        .await
        .unwrap();

    // Worker finishes after the cancel: its success must not stick
    assert!(!db::jobs::mark_succeeded(&state.db, job_id).await.unwrap());

    let job = db::jobs::get_job(&state.db, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.last_error.as_deref(), Some("user cancel"));
}

#[tokio::test]
async fn explicit_cancel_overrides_done() {
    let (_dir, state, _) = common::setup().await;
    let job_id = enqueue_translate(&state).await;

    db::jobs::mark_running(&state.db, job_id).await.unwrap();
    assert!(db::jobs::mark_succeeded(&state.db, job_id).await.unwrap());

    // A user cancel after completion still lands
    db::jobs::mark_cancelled(&state.db, job_id, None).await.unwrap();

    let job = db::jobs::get_job(&state.db, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    // finished_at from the success is preserved
    assert!(job.finished_at.is_some());
}

#[tokio::test]
async fn failed_job_records_reason_and_rejects_success() {
    let (_dir, state, _) = common::setup().await;
    let job_id = enqueue_translate(&state).await;

    db::jobs::mark_running(&state.db, job_id).await.unwrap();
    assert!(db::jobs::mark_failed(&state.db, job_id, "model exploded")
        .await
        .unwrap());
    assert!(!db::jobs::mark_succeeded(&state.db, job_id).await.unwrap());

    let job = db::jobs::get_job(&state.db, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("model exploded"));
}

#[tokio::test]
async fn synthesis_claim_is_one_shot() {
    let (_dir, state, _) = common::setup().await;
    let job_id = enqueue_translate(&state).await;

    assert!(db::jobs::claim_synthesis(&state.db, job_id).await.unwrap());
    assert!(!db::jobs::claim_synthesis(&state.db, job_id).await.unwrap());

    let job = db::jobs::get_job(&state.db, job_id).await.unwrap().unwrap();
    assert!(job.synthesis_queued);
}

#[tokio::test]
async fn claim_next_queued_takes_oldest_translate_only() {
    let (_dir, state, _) = common::setup().await;
    let project = common::seed_project(&state.db).await;
    let user = uuid::Uuid::new_v4();

    // Non-translate job is ignored by translate workers
    db::jobs::enqueue(
        &state.db,
        JobType::Analyze,
        project.project_id,
        user,
        None,
        serde_json::json!({}),
    )
    .await
    .unwrap();

    let first = db::jobs::enqueue(
        &state.db,
        JobType::Translate,
        project.project_id,
        user,
        None,
        serde_json::json!({"which": "first"}),
    )
    .await
    .unwrap();

    let claimed = db::jobs::claim_next_queued(&state.db, JobType::Translate)
        .await
        .unwrap()
        .expect("a translate job is queued");
    assert_eq!(claimed.job_id, first);
    assert_eq!(claimed.status, JobStatus::Running);

    // Nothing else claimable
    assert!(db::jobs::claim_next_queued(&state.db, JobType::Translate)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn stale_jobs_are_cancelled_on_startup() {
    let (_dir, state, _) = common::setup().await;
    let queued = enqueue_translate(&state).await;
    let running = enqueue_translate(&state).await;
    db::jobs::mark_running(&state.db, running).await.unwrap();

    let cleaned = db::jobs::cleanup_stale_jobs(&state.db).await.unwrap();
    assert_eq!(cleaned, 2);

    for job_id in [queued, running] {
        let job = db::jobs::get_job(&state.db, job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.last_error.as_deref().unwrap_or("").contains("restarted"));
    }
}
