//! Chain constructors for every high-level workflow transition.
//!
//! A chain is a serial list of jobs: only the first is inserted `pending`;
//! each later link sits `on_hold` until its predecessor succeeds and
//! releases it. Insertion is all-or-nothing.

use std::collections::BTreeMap;

use chrono::Utc;
use presswork_config::Config;
use presswork_model::job::args;
use presswork_model::workflow::WorkflowStep;
use presswork_model::{Batch, BatchStatus, Issue, Job, JobStatus, JobType, ObjectType};

use crate::error::{EngineError, Result};
use crate::fsutil::wip_name;
use crate::store::Store;

/// A job of any kind with sensible defaults: pending, ready to run now.
pub fn prepare_job(job_type: JobType, job_args: BTreeMap<String, String>) -> Job {
    Job::new(job_type, job_args, Utc::now())
}

/// An issue-targeted job, not yet saved, for assembling into a chain.
pub fn prepare_issue_job(
    job_type: JobType,
    issue: &Issue,
    job_args: BTreeMap<String, String>,
) -> Job {
    let mut job = prepare_job(job_type, job_args);
    job.object_type = ObjectType::Issue;
    job.object_id = issue.id;
    job.location = issue.location.clone();
    job
}

/// A batch-targeted job, not yet saved.
pub fn prepare_batch_job(
    job_type: JobType,
    batch: &Batch,
    job_args: BTreeMap<String, String>,
) -> Job {
    let mut job = prepare_job(job_type, job_args);
    job.object_type = ObjectType::Batch;
    job.object_id = batch.id;
    job
}

fn ws_args(step: WorkflowStep) -> BTreeMap<String, String> {
    BTreeMap::from([(args::WORKFLOW_STEP.to_string(), step.as_str().to_string())])
}

fn batch_status_args(status: BatchStatus) -> BTreeMap<String, String> {
    BTreeMap::from([(args::BATCH_STATUS.to_string(), status.as_str().to_string())])
}

fn loc_args(location: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(args::LOCATION.to_string(), location.to_string())])
}

fn rename_args(src: &str, dest: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (args::SOURCE.to_string(), src.to_string()),
        (args::DESTINATION.to_string(), dest.to_string()),
    ])
}

/// Saves the jobs as one serial chain inside a transaction. Iterates in
/// reverse so each job's successor id is known before it is inserted: the
/// first job comes out `pending`, every other link `on_hold`. Returns the
/// ids in chain order.
pub async fn queue_serial(store: &Store, mut jobs: Vec<Job>) -> Result<Vec<i64>> {
    if jobs.is_empty() {
        return Err(EngineError::Validation("empty job chain".to_string()));
    }

    let mut tx = store.begin().await?;

    let mut last_job_id = 0i64;
    let mut ids = vec![0i64; jobs.len()];
    for i in (0..jobs.len()).rev() {
        let job = &mut jobs[i];
        job.queue_job_id = last_job_id;
        if i != 0 {
            job.status = JobStatus::OnHold;
        }
        let saved = Store::save_job_op(&mut tx, job).await?;
        last_job_id = saved.id;
        ids[i] = saved.id;
    }

    tx.commit().await?;
    Ok(ids)
}

/// Queues an issue move from the SFTP upload area into the workflow,
/// followed by a page split and the move into page review.
pub async fn queue_sftp_issue_move(store: &Store, issue: &Issue) -> Result<Vec<i64>> {
    queue_serial(
        store,
        vec![
            prepare_issue_job(
                JobType::SetIssueWorkflowStep,
                issue,
                ws_args(WorkflowStep::AwaitingProcessing),
            ),
            prepare_issue_job(JobType::MoveIssueToWorkflow, issue, BTreeMap::new()),
            prepare_issue_job(JobType::PageSplit, issue, BTreeMap::new()),
            prepare_issue_job(JobType::MoveIssueToPageReview, issue, BTreeMap::new()),
            prepare_issue_job(
                JobType::SetIssueWorkflowStep,
                issue,
                ws_args(WorkflowStep::AwaitingPageReview),
            ),
        ],
    )
    .await
}

/// Queues an issue move into the workflow followed immediately by
/// derivative generation.
pub async fn queue_move_issue_for_derivatives(store: &Store, issue: &Issue) -> Result<Vec<i64>> {
    queue_serial(
        store,
        vec![
            prepare_issue_job(
                JobType::SetIssueWorkflowStep,
                issue,
                ws_args(WorkflowStep::AwaitingProcessing),
            ),
            prepare_issue_job(JobType::MoveIssueToWorkflow, issue, BTreeMap::new()),
            prepare_issue_job(JobType::MakeDerivatives, issue, BTreeMap::new()),
            prepare_issue_job(
                JobType::SetIssueWorkflowStep,
                issue,
                ws_args(WorkflowStep::ReadyForMetadataEntry),
            ),
        ],
    )
    .await
}

/// Queues the jobs that get an approved issue ready for batching: METS
/// generation, archiving of the master PDFs into the issue directory, and
/// removal of the now-redundant master backup.
pub async fn queue_finalize_issue(store: &Store, issue: &Issue) -> Result<Vec<i64>> {
    queue_serial(
        store,
        vec![
            prepare_issue_job(JobType::BuildMets, issue, BTreeMap::new()),
            prepare_issue_job(JobType::ArchiveMasterFiles, issue, BTreeMap::new()),
            prepare_job(
                JobType::DeleteDirectory,
                loc_args(&issue.master_backup_location),
            ),
            prepare_issue_job(JobType::SetIssueMasterBackupLocation, issue, loc_args("")),
            prepare_issue_job(
                JobType::SetIssueWorkflowStep,
                issue,
                ws_args(WorkflowStep::ReadyForBatching),
            ),
        ],
    )
    .await
}

/// Queues batch generation: build the structure and batch XML under a WIP
/// directory, rename it into place, flip the batch to QC-ready, and write
/// the bagit manifest. Nothing further happens automatically until the
/// batch is verified on staging.
pub async fn queue_make_batch(store: &Store, batch: &Batch, config: &Config) -> Result<Vec<i64>> {
    let full_name = batch.full_name().to_string();
    let wip_dir = config.batch_output_path.join(wip_name(&full_name));
    let final_dir = config.batch_output_path.join(&full_name);
    let wip_str = wip_dir.to_string_lossy().into_owned();
    let final_str = final_dir.to_string_lossy().into_owned();

    queue_serial(
        store,
        vec![
            prepare_batch_job(JobType::CreateBatchStructure, batch, loc_args(&wip_str)),
            prepare_batch_job(JobType::SetBatchLocation, batch, loc_args(&wip_str)),
            prepare_batch_job(JobType::MakeBatchXml, batch, BTreeMap::new()),
            prepare_job(JobType::RenameDirectory, rename_args(&wip_str, &final_str)),
            prepare_batch_job(JobType::SetBatchLocation, batch, loc_args(&final_str)),
            prepare_batch_job(
                JobType::SetBatchStatus,
                batch,
                batch_status_args(BatchStatus::QcReady),
            ),
            prepare_batch_job(JobType::WriteBagitManifest, batch, BTreeMap::new()),
        ],
    )
    .await
}
