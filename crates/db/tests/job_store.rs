//! Integration tests for the Job Store against an in-memory database.

use std::time::Duration;

use serde_json::json;

use corral_db::models::job::{JobListQuery, SubmitJob};
use corral_db::models::status::JobStatus;
use corral_db::repositories::JobRepo;
use corral_db::{create_test_pool, DbPool};

fn submit(job_type: &str, metadata: serde_json::Value) -> SubmitJob {
    SubmitJob {
        job_type: job_type.to_string(),
        metadata,
    }
}

async fn pool() -> DbPool {
    create_test_pool().await.expect("in-memory pool")
}

#[tokio::test]
async fn create_and_fetch_roundtrip() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("generate", json!({"total_items": 10})), Some("u1"))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);
    assert_eq!(job.owner_id.as_deref(), Some("u1"));
    assert!(job.completed_at.is_none());
    assert!(job.checkpoint().is_none());

    let fetched = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, job.id);
    assert_eq!(fetched.metadata["total_items"], 10);
}

#[tokio::test]
async fn claim_next_takes_oldest_pending_and_marks_running() {
    let pool = pool().await;
    let first = JobRepo::create(&pool, &submit("verify", json!({})), None)
        .await
        .unwrap();
    let _second = JobRepo::create(&pool, &submit("scrape", json!({})), None)
        .await
        .unwrap();

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status, JobStatus::Running);

    let second_claim = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_ne!(second_claim.id, first.id);

    // Queue exhausted.
    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn commit_unit_merges_metadata_and_folds_partials() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("generate", json!({"total_items": 200})), None)
        .await
        .unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    let applied = JobRepo::commit_unit(
        &pool,
        job.id,
        50,
        &json!({"processed": 100}),
        Some(&json!({"next_index": 100})),
        Some(&json!(["r1", "r2"])),
    )
    .await
    .unwrap();
    assert!(applied);

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.progress, 50);
    assert_eq!(job.metadata["total_items"], 200, "untouched field preserved");
    assert_eq!(job.metadata["processed"], 100);
    assert_eq!(job.checkpoint().unwrap()["next_index"], 100);
    assert_eq!(job.result_data.as_ref().unwrap(), &json!(["r1", "r2"]));

    // Second unit extends the accumulated results.
    JobRepo::commit_unit(
        &pool,
        job.id,
        100,
        &json!({"processed": 200}),
        Some(&json!({"next_index": 200})),
        Some(&json!(["r3"])),
    )
    .await
    .unwrap();

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.result_data.as_ref().unwrap(), &json!(["r1", "r2", "r3"]));
    assert_eq!(job.checkpoint().unwrap()["next_index"], 200);
}

#[tokio::test]
async fn save_checkpoint_leaves_progress_and_metadata_alone() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("generate", json!({"total_items": 500})), None)
        .await
        .unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::update_progress(&pool, job.id, 20, &json!({"processed": 100})).await.unwrap();

    let applied = JobRepo::save_checkpoint(&pool, job.id, &json!({"next_index": 100}))
        .await
        .unwrap();
    assert!(applied);

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.checkpoint().unwrap()["next_index"], 100);
    assert_eq!(job.progress, 20);
    assert_eq!(job.metadata["total_items"], 500);
    assert_eq!(job.metadata["processed"], 100);

    // Terminal: the write is a no-op.
    JobRepo::cancel(&pool, job.id).await.unwrap();
    let applied = JobRepo::save_checkpoint(&pool, job.id, &json!({"next_index": 200}))
        .await
        .unwrap();
    assert!(!applied);

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.checkpoint().unwrap()["next_index"], 100);
}

#[tokio::test]
async fn progress_is_monotonic_while_running() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("generate", json!({})), None)
        .await
        .unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    JobRepo::update_progress(&pool, job.id, 40, &json!({})).await.unwrap();
    // A lower value must not move progress backwards.
    JobRepo::update_progress(&pool, job.id, 10, &json!({})).await.unwrap();

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.progress, 40);
}

#[tokio::test]
async fn progress_updates_rejected_unless_running() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("generate", json!({})), None)
        .await
        .unwrap();

    // Still pending: no write.
    let applied = JobRepo::update_progress(&pool, job.id, 10, &json!({})).await.unwrap();
    assert!(!applied);

    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::cancel(&pool, job.id).await.unwrap();

    // Cancelled: the worker's late write is a no-op.
    let applied = JobRepo::update_progress(&pool, job.id, 90, &json!({})).await.unwrap();
    assert!(!applied);

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.progress, 0);
    assert_eq!(job.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn terminal_states_reject_further_transitions() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("verify", json!({})), None)
        .await
        .unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    assert!(JobRepo::complete(&pool, job.id, None).await.unwrap());

    // No transition leaves a terminal state.
    assert!(!JobRepo::fail(&pool, job.id, "late failure").await.unwrap());
    assert!(!JobRepo::cancel(&pool, job.id).await.unwrap());
    assert!(!JobRepo::complete(&pool, job.id, None).await.unwrap());

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.error_message.is_none());
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn cancel_pending_job_directly() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("scrape", json!({})), None)
        .await
        .unwrap();

    assert!(JobRepo::cancel(&pool, job.id).await.unwrap());

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.error_message.is_none());
    assert!(job.progress < 100);
}

#[tokio::test]
async fn fail_preserves_partial_results() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("generate", json!({})), None)
        .await
        .unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::commit_unit(
        &pool,
        job.id,
        30,
        &json!({"processed": 300}),
        Some(&json!({"next_index": 300})),
        Some(&json!(["a", "b", "c"])),
    )
    .await
    .unwrap();

    assert!(JobRepo::fail(&pool, job.id, "upstream gave up").await.unwrap());

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("upstream gave up"));
    assert_eq!(job.result_data.as_ref().unwrap(), &json!(["a", "b", "c"]));
    assert_eq!(job.checkpoint().unwrap()["next_index"], 300);
}

#[tokio::test]
async fn recent_duplicate_found_within_window() {
    let pool = pool().await;
    let original = JobRepo::create(&pool, &submit("generate", json!({})), Some("u1"))
        .await
        .unwrap();

    let dup = JobRepo::find_recent_duplicate(&pool, "generate", Some("u1"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(dup.unwrap().id, original.id);

    // Different owner or type: no duplicate.
    assert!(JobRepo::find_recent_duplicate(&pool, "generate", Some("u2"), Duration::from_secs(5))
        .await
        .unwrap()
        .is_none());
    assert!(JobRepo::find_recent_duplicate(&pool, "verify", Some("u1"), Duration::from_secs(5))
        .await
        .unwrap()
        .is_none());

    // A zero-width window excludes the prior submission.
    assert!(JobRepo::find_recent_duplicate(&pool, "generate", Some("u1"), Duration::ZERO)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn terminal_jobs_are_not_duplicates() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("generate", json!({})), Some("u1"))
        .await
        .unwrap();
    JobRepo::cancel(&pool, job.id).await.unwrap();

    let dup = JobRepo::find_recent_duplicate(&pool, "generate", Some("u1"), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(dup.is_none());
}

#[tokio::test]
async fn list_filters_by_owner_status_and_type() {
    let pool = pool().await;
    JobRepo::create(&pool, &submit("generate", json!({})), Some("u1")).await.unwrap();
    let other = JobRepo::create(&pool, &submit("verify", json!({})), Some("u1"))
        .await
        .unwrap();
    JobRepo::create(&pool, &submit("generate", json!({})), Some("u2")).await.unwrap();
    JobRepo::cancel(&pool, other.id).await.unwrap();

    let all_u1 = JobRepo::list(&pool, Some("u1"), &JobListQuery::default()).await.unwrap();
    assert_eq!(all_u1.len(), 2);

    let cancelled = JobRepo::list(
        &pool,
        Some("u1"),
        &JobListQuery {
            status: Some(JobStatus::Cancelled),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, other.id);

    let generates = JobRepo::list(
        &pool,
        None,
        &JobListQuery {
            job_type: Some("generate".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(generates.len(), 2);
}

#[tokio::test]
async fn retention_deletes_only_old_terminal_jobs() {
    let pool = pool().await;
    let done = JobRepo::create(&pool, &submit("generate", json!({})), None)
        .await
        .unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::complete(&pool, done.id, None).await.unwrap();

    let active = JobRepo::create(&pool, &submit("verify", json!({})), None)
        .await
        .unwrap();

    // Cutoff in the past removes nothing.
    let removed = JobRepo::delete_terminal_older_than(
        &pool,
        chrono::Utc::now() - chrono::Duration::hours(1),
    )
    .await
    .unwrap();
    assert_eq!(removed, 0);

    // Cutoff in the future removes the terminal job but not the pending one.
    let removed = JobRepo::delete_terminal_older_than(
        &pool,
        chrono::Utc::now() + chrono::Duration::hours(1),
    )
    .await
    .unwrap();
    assert_eq!(removed, 1);

    assert!(JobRepo::find_by_id(&pool, done.id).await.unwrap().is_none());
    assert!(JobRepo::find_by_id(&pool, active.id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_reports_whether_row_existed() {
    let pool = pool().await;
    let job = JobRepo::create(&pool, &submit("import", json!({})), None)
        .await
        .unwrap();

    assert!(JobRepo::delete(&pool, job.id).await.unwrap());
    assert!(!JobRepo::delete(&pool, job.id).await.unwrap());
}
