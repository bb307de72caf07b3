//! Store-level guarantees: the atomic pop, ordering, and the ownership
//! predicates.

mod common;

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use presswork_core::Store;
use presswork_model::{Issue, Job, JobStatus, JobType, WorkflowStep};

use std::collections::BTreeMap;

fn pending_job(job_type: JobType, created_offset_secs: i64) -> Job {
    let now = Utc::now();
    let mut job = Job::new(job_type, BTreeMap::new(), now + Duration::seconds(created_offset_secs));
    job.run_at = now - Duration::seconds(60);
    job
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn pop_returns_oldest_eligible_job(pool: SqlitePool) {
    let store = Store::from_pool(pool);

    let newer = store.save_job(&pending_job(JobType::DeleteDirectory, 10)).await.unwrap();
    let older = store.save_job(&pending_job(JobType::DeleteDirectory, 0)).await.unwrap();

    let first = store
        .pop_next_pending_job(&[JobType::DeleteDirectory], Utc::now())
        .await
        .unwrap()
        .expect("a job should be eligible");
    assert_eq!(first.id, older.id);
    assert_eq!(first.status, JobStatus::InProcess);
    assert!(first.started_at.is_some());

    let second = store
        .pop_next_pending_job(&[JobType::DeleteDirectory], Utc::now())
        .await
        .unwrap()
        .expect("the newer job should still be eligible");
    assert_eq!(second.id, newer.id);

    assert!(store
        .pop_next_pending_job(&[JobType::DeleteDirectory], Utc::now())
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn pop_ties_break_by_id(pool: SqlitePool) {
    let store = Store::from_pool(pool);

    let now = Utc::now();
    let mut a = Job::new(JobType::DeleteDirectory, BTreeMap::new(), now);
    a.run_at = now - Duration::seconds(1);
    let mut b = a.clone();
    let a = store.save_job(&a).await.unwrap();
    b.created_at = a.created_at;
    store.save_job(&b).await.unwrap();

    let first = store
        .pop_next_pending_job(&[JobType::DeleteDirectory], now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, a.id);
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn pop_respects_type_filter_and_run_at(pool: SqlitePool) {
    let store = Store::from_pool(pool);
    let now = Utc::now();

    // Wrong type
    store.save_job(&pending_job(JobType::SyncDirectory, 0)).await.unwrap();
    // Right type, but not yet runnable
    let mut future = pending_job(JobType::DeleteDirectory, 0);
    future.run_at = now + Duration::hours(1);
    store.save_job(&future).await.unwrap();
    // On hold
    let mut held = pending_job(JobType::DeleteDirectory, 0);
    held.status = JobStatus::OnHold;
    store.save_job(&held).await.unwrap();

    assert!(store
        .pop_next_pending_job(&[JobType::DeleteDirectory], now)
        .await
        .unwrap()
        .is_none());

    // The future job becomes eligible once the clock passes run_at
    let later = now + Duration::hours(2);
    let popped = store
        .pop_next_pending_job(&[JobType::DeleteDirectory], later)
        .await
        .unwrap();
    assert!(popped.is_some());
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn concurrent_pops_never_share_a_job(pool: SqlitePool) {
    let store = Store::from_pool(pool);

    let total = 20;
    for i in 0..total {
        store.save_job(&pending_job(JobType::DeleteDirectory, i)).await.unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            loop {
                match store
                    .pop_next_pending_job(&[JobType::DeleteDirectory], Utc::now())
                    .await
                {
                    Ok(Some(job)) => ids.push(job.id),
                    Ok(None) => break,
                    Err(err) => panic!("pop failed: {err}"),
                }
            }
            ids
        }));
    }

    let mut seen = Vec::new();
    for task in tasks {
        seen.extend(task.await.unwrap());
    }

    seen.sort();
    let before_dedup = seen.len();
    seen.dedup();
    assert_eq!(seen.len(), before_dedup, "a job was popped twice");
    assert_eq!(seen.len() as i64, total, "every job should be popped exactly once");
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn expired_claims_flip_availability_without_a_write(pool: SqlitePool) {
    let store = Store::from_pool(pool);
    let now = Utc::now();

    let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
    issue.workflow_step = WorkflowStep::ReadyForMetadataEntry;
    issue.claim(3, now);
    let issue = store.save_issue(&issue).await.unwrap();

    // Claimed: on the user's desk, not in the available pool
    let desk = store.find_issues_on_desk(3, now).await.unwrap();
    assert_eq!(desk.len(), 1);
    let available = store
        .find_available_issues_by_step(WorkflowStep::ReadyForMetadataEntry, now)
        .await
        .unwrap();
    assert!(available.is_empty());

    // 7 days + 1 second later: available again, with storage untouched
    let later = now + Duration::days(7) + Duration::seconds(1);
    let desk = store.find_issues_on_desk(3, later).await.unwrap();
    assert!(desk.is_empty());
    let available = store
        .find_available_issues_by_step(WorkflowStep::ReadyForMetadataEntry, later)
        .await
        .unwrap();
    assert_eq!(available.len(), 1);

    let stored = store.find_issue(issue.id).await.unwrap().unwrap();
    assert_eq!(stored.workflow_owner_id, 3);
    assert!(stored.workflow_owner_expires_at.is_some());
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn errored_issues_are_not_available(pool: SqlitePool) {
    let store = Store::from_pool(pool);
    let now = Utc::now();

    let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
    issue.workflow_step = WorkflowStep::ReadyForMetadataEntry;
    issue.error = "duplicate pages".to_string();
    store.save_issue(&issue).await.unwrap();

    let available = store
        .find_available_issues_by_step(WorkflowStep::ReadyForMetadataEntry, now)
        .await
        .unwrap();
    assert!(available.is_empty());
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn issue_round_trips_through_storage(pool: SqlitePool) {
    let store = Store::from_pool(pool);

    let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 2);
    issue.page_labels = vec!["1".to_string(), "2".to_string(), "3A".to_string()];
    issue.volume = "12".to_string();
    issue.is_from_scanner = true;
    let saved = store.save_issue(&issue).await.unwrap();

    let loaded = store.find_issue(saved.id).await.unwrap().unwrap();
    assert_eq!(loaded.page_labels, issue.page_labels);
    assert_eq!(loaded.volume, "12");
    assert_eq!(loaded.edition, 2);
    assert!(loaded.is_from_scanner);
    assert_eq!(loaded.workflow_step, WorkflowStep::AwaitingProcessing);
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn job_args_round_trip_through_storage(pool: SqlitePool) {
    let store = Store::from_pool(pool);

    let args = BTreeMap::from([
        ("WorkflowStep".to_string(), "ready_for_batching".to_string()),
        ("Location".to_string(), "/mnt/somewhere".to_string()),
    ]);
    let job = store
        .save_job(&Job::new(JobType::SetIssueWorkflowStep, args.clone(), Utc::now()))
        .await
        .unwrap();

    let loaded = store.find_job(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.args, args);
    assert_eq!(loaded.job_type, JobType::SetIssueWorkflowStep);
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn job_logs_append_and_read_back(pool: SqlitePool) {
    let store = Store::from_pool(pool);
    let job = store
        .save_job(&Job::new(JobType::DeleteDirectory, BTreeMap::new(), Utc::now()))
        .await
        .unwrap();

    store.append_job_log(job.id, "INFO", "starting").await.unwrap();
    store.append_job_log(job.id, "CRIT", "disk vanished").await.unwrap();

    let logs = store.job_logs(job.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].log_level, "INFO");
    assert_eq!(logs[1].message, "disk vanished");
}
