//! Integration tests for the Postgres job, task and domain repositories.
//!
//! These need a live database (`DATABASE_URL`); run with
//! `cargo test -p bigshot-db -- --ignored`.

use bigshot_core::job_events::UpdateType;
use bigshot_core::job_result::NotificationEntry;
use bigshot_core::job_status::JobStatus;
use bigshot_core::job_type::JobType;
use bigshot_core::task_state::TaskState;
use bigshot_core::work::TaskPayload;
use bigshot_db::models::job::{CreateJob, JobChanges};
use bigshot_db::models::task::RevokeOutcome;
use bigshot_db::repositories::{DomainRepo, JobRepo, TaskRepo};
use sqlx::PgPool;

fn cleanup_job() -> CreateJob {
    CreateJob {
        job_type: JobType::DataCleanup,
        target: None,
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn guarded_update_rejects_late_writer(pool: PgPool) {
    let job = JobRepo::create(&pool, &cleanup_job()).await.unwrap();
    let cancel = JobChanges::transition(JobStatus::Cancelled);
    assert!(JobRepo::update(&pool, job.id, &cancel).await.unwrap().is_some());

    let late = JobRepo::update(
        &pool,
        job.id,
        &JobChanges::transition(JobStatus::Completed).progress(100),
    )
    .await
    .unwrap();
    assert!(late.is_none());
    assert!(JobRepo::update(&pool, job.id, &cancel).await.unwrap().is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn ledger_append_keeps_keys_of_a_malformed_envelope(pool: PgPool) {
    let job = JobRepo::create(&pool, &cleanup_job()).await.unwrap();
    sqlx::query("UPDATE jobs SET result = $2 WHERE id = $1")
        .bind(job.id)
        .bind(serde_json::json!({ "task_id": 42, "notifications": "not-a-list" }))
        .execute(&pool)
        .await
        .unwrap();

    let updated = JobRepo::update(
        &pool,
        job.id,
        &JobChanges::default().notify(NotificationEntry::new(
            UpdateType::Progress,
            serde_json::Value::Null,
        )),
    )
    .await
    .unwrap()
    .unwrap();

    let stored = updated.result.unwrap();
    assert_eq!(stored["task_id"], 42);
    assert_eq!(stored["notifications"].as_array().unwrap().len(), 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn envelope_updates_merge_and_append(pool: PgPool) {
    let job = JobRepo::create(&pool, &cleanup_job()).await.unwrap();
    JobRepo::update(&pool, job.id, &JobChanges::default().task_id("t-1"))
        .await
        .unwrap();
    let updated = JobRepo::update(
        &pool,
        job.id,
        &JobChanges::transition(JobStatus::Running).notify(NotificationEntry::new(
            UpdateType::Started,
            serde_json::Value::Null,
        )),
    )
    .await
    .unwrap()
    .unwrap();

    let envelope = updated.result_envelope();
    assert_eq!(envelope.task_id.as_deref(), Some("t-1"));
    assert_eq!(envelope.notifications.len(), 1);
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn claimed_task_is_not_claimed_twice(pool: PgPool) {
    let job = JobRepo::create(&pool, &cleanup_job()).await.unwrap();
    let task = TaskRepo::enqueue(&pool, job.id, &TaskPayload::DataCleanup { days_old: 30 })
        .await
        .unwrap();

    let claimed = TaskRepo::claim_next(&pool, "w1").await.unwrap().unwrap();
    assert_eq!(claimed.id, task.id);
    assert_eq!(claimed.state, TaskState::Running);
    assert!(TaskRepo::claim_next(&pool, "w2").await.unwrap().is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn revoking_unknown_or_finished_task_is_reported(pool: PgPool) {
    let job = JobRepo::create(&pool, &cleanup_job()).await.unwrap();
    let task = TaskRepo::enqueue(&pool, job.id, &TaskPayload::DataNormalization)
        .await
        .unwrap();

    assert_eq!(
        TaskRepo::revoke(&pool, task.id).await.unwrap(),
        RevokeOutcome::Revoked
    );
    assert_eq!(
        TaskRepo::revoke(&pool, task.id).await.unwrap(),
        RevokeOutcome::AlreadyFinished(TaskState::Revoked)
    );
    assert_eq!(
        TaskRepo::revoke(&pool, uuid::Uuid::new_v4()).await.unwrap(),
        RevokeOutcome::Unknown
    );
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn domain_upsert_reports_insert_then_refresh(pool: PgPool) {
    assert!(DomainRepo::upsert(&pool, "a.com", "x.a.com", "crt.sh")
        .await
        .unwrap());
    assert!(!DomainRepo::upsert(&pool, "a.com", "x.a.com", "crt.sh")
        .await
        .unwrap());
}
