//! Runner behavior: success finalization with successor release, failure
//! leaving chains held, and the requeue / force-rerun recovery paths.

mod common;

use chrono::Utc;
use sqlx::SqlitePool;

use common::{arc_config, seed_dir, seed_issue};
use presswork_core::{queue, runner, Runner, Store};
use presswork_model::{JobStatus, JobType, ObjectType, WorkflowStep};

/// Drains every currently runnable job, the way a watch loop would.
async fn drain(runner: &Runner, store: &Store, types: &[JobType]) {
    loop {
        match store.pop_next_pending_job(types, Utc::now()).await.unwrap() {
            Some(job) => runner.process(job).await,
            None => break,
        }
    }
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn successful_chain_runs_to_completion(pool: SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let config = arc_config(dir.path());
    let store = Store::from_pool(pool);

    // Seed the issue's source directory in the fake SFTP area
    let source = dir.path().join("sftp/incoming");
    seed_dir(&source, &["page-a.pdf", "page-b.pdf"]);
    let issue = seed_issue(&store, &source.to_string_lossy()).await;

    // A short all-runnable chain: set step, move into workflow, set step
    let ids = queue::queue_move_issue_for_derivatives(&store, &issue)
        .await
        .unwrap();

    let all_types = vec![
        JobType::SetIssueWorkflowStep,
        JobType::MoveIssueToWorkflow,
        JobType::MakeDerivatives,
    ];
    let runner = Runner::new(store.clone(), config.clone(), all_types.clone());

    // First drain: set-ws succeeds, move succeeds, then make_derivatives
    // fails (no fake builder installed) - which is fine for this test; we
    // stop at the move.
    drain(&runner, &store, &[JobType::SetIssueWorkflowStep]).await;

    let issue_now = store.find_issue(issue.id).await.unwrap().unwrap();
    assert_eq!(issue_now.workflow_step, WorkflowStep::AwaitingProcessing);

    // The successor was released and carries the issue's location
    let move_job = store.find_job(ids[1]).await.unwrap().unwrap();
    assert_eq!(move_job.status, JobStatus::Pending);
    assert_eq!(move_job.location, issue_now.location);

    drain(&runner, &store, &[JobType::MoveIssueToWorkflow]).await;

    let issue_now = store.find_issue(issue.id).await.unwrap().unwrap();
    let expected = config.workflow_path.join(&issue_now.human_name);
    assert_eq!(issue_now.location, expected.to_string_lossy());
    assert!(expected.join("page-a.pdf").is_file());
    assert!(!source.exists(), "source must be cleaned up after the move");
    common::assert_no_wip(&[&config.workflow_path]);

    // The move's successor got the *new* location copied forward
    let deriv_job = store.find_job(ids[2]).await.unwrap().unwrap();
    assert_eq!(deriv_job.status, JobStatus::Pending);
    assert_eq!(deriv_job.location, issue_now.location);
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn failed_job_leaves_chain_on_hold(pool: SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let config = arc_config(dir.path());
    let store = Store::from_pool(pool);

    // No source directory on disk: the move's copy will fail
    let issue = seed_issue(&store, "").await;
    let ids = queue::queue_sftp_issue_move(&store, &issue).await.unwrap();

    let runner = Runner::new(
        store.clone(),
        config,
        vec![JobType::SetIssueWorkflowStep, JobType::MoveIssueToWorkflow],
    );
    drain(
        &runner,
        &store,
        &[JobType::SetIssueWorkflowStep, JobType::MoveIssueToWorkflow],
    )
    .await;

    let move_job = store.find_job(ids[1]).await.unwrap().unwrap();
    assert_eq!(move_job.status, JobStatus::Failed);
    assert!(move_job.completed_at.is_some());

    // Everything downstream stays held, and the workflow step is unchanged
    for id in &ids[2..] {
        let held = store.find_job(*id).await.unwrap().unwrap();
        assert_eq!(held.status, JobStatus::OnHold);
    }
    let issue_now = store.find_issue(issue.id).await.unwrap().unwrap();
    assert_eq!(issue_now.workflow_step, WorkflowStep::AwaitingProcessing);

    // The failure is on record for the operator
    let logs = store.job_logs(move_job.id).await.unwrap();
    assert!(!logs.is_empty());
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn requeue_clones_a_failed_job_and_closes_the_original(pool: SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let config = arc_config(dir.path());
    let store = Store::from_pool(pool);

    let issue = seed_issue(&store, "").await;
    let ids = queue::queue_sftp_issue_move(&store, &issue).await.unwrap();

    let runner = Runner::new(
        store.clone(),
        config.clone(),
        vec![JobType::SetIssueWorkflowStep, JobType::MoveIssueToWorkflow],
    );
    drain(
        &runner,
        &store,
        &[JobType::SetIssueWorkflowStep, JobType::MoveIssueToWorkflow],
    )
    .await;

    let failed = store.find_job(ids[1]).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);

    let clone_id = runner::requeue(&store, failed.id).await.unwrap();
    let clone = store.find_job(clone_id).await.unwrap().unwrap();
    assert_eq!(clone.status, JobStatus::Pending);
    assert_eq!(clone.job_type, failed.job_type);
    assert_eq!(clone.object_type, ObjectType::Issue);
    assert_eq!(clone.object_id, failed.object_id);
    assert_eq!(clone.args, failed.args);
    assert_eq!(
        clone.queue_job_id, failed.queue_job_id,
        "the clone must resume the original chain"
    );

    let original = store.find_job(failed.id).await.unwrap().unwrap();
    assert_eq!(original.status, JobStatus::FailedDone);

    // Fix the filesystem and let the clone run: the chain resumes
    let source = dir.path().join("sftp/incoming");
    seed_dir(&source, &["page-a.pdf", "page-b.pdf"]);
    let mut issue_now = store.find_issue(issue.id).await.unwrap().unwrap();
    issue_now.location = source.to_string_lossy().into_owned();
    store.save_issue(&issue_now).await.unwrap();

    drain(&runner, &store, &[JobType::MoveIssueToWorkflow]).await;
    let rerun = store.find_job(clone_id).await.unwrap().unwrap();
    assert_eq!(rerun.status, JobStatus::Success);

    let next = store.find_job(rerun.queue_job_id).await.unwrap().unwrap();
    assert_eq!(next.status, JobStatus::Pending, "chain resumed past the clone");
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn requeue_refuses_non_failed_jobs(pool: SqlitePool) {
    let store = Store::from_pool(pool);
    let issue = seed_issue(&store, "/anywhere").await;
    let ids = queue::queue_sftp_issue_move(&store, &issue).await.unwrap();

    // Head is pending, not failed
    assert!(runner::requeue(&store, ids[0]).await.is_err());
    // Held links can't be requeued either
    assert!(runner::requeue(&store, ids[1]).await.is_err());
    // Unknown ids are rejected
    assert!(runner::requeue(&store, 999_999).await.is_err());
}

#[sqlx::test(migrator = "presswork_core::MIGRATOR")]
async fn force_rerun_starts_an_independent_chain(pool: SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let config = arc_config(dir.path());
    let store = Store::from_pool(pool);

    let issue = seed_issue(&store, "").await;
    let ids = queue::queue_sftp_issue_move(&store, &issue).await.unwrap();

    let runner = Runner::new(
        store.clone(),
        config,
        vec![JobType::SetIssueWorkflowStep, JobType::MoveIssueToWorkflow],
    );
    drain(
        &runner,
        &store,
        &[JobType::SetIssueWorkflowStep, JobType::MoveIssueToWorkflow],
    )
    .await;

    let failed = store.find_job(ids[1]).await.unwrap().unwrap();
    let clone_id = runner::force_rerun(&store, failed.id).await.unwrap();

    let clone = store.find_job(clone_id).await.unwrap().unwrap();
    assert_eq!(clone.status, JobStatus::Pending);
    assert_eq!(clone.queue_job_id, 0, "force-rerun must clear the successor");

    // Unlike requeue, the original is left as-is
    let original = store.find_job(failed.id).await.unwrap().unwrap();
    assert_eq!(original.status, JobStatus::Failed);

    // In-flight jobs can't be cloned
    assert!(runner::force_rerun(&store, ids[2]).await.is_err());
}
