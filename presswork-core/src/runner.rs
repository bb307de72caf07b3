//! Runners poll the store for pending jobs of their assigned types,
//! dispatch them to handlers, and finalize status. Several runners - in one
//! process or many - share the work safely because the pop is atomic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use presswork_config::Config;
use presswork_model::job::args;
use presswork_model::workflow::WorkflowStep;
use presswork_model::{Job, JobStatus, JobType, ObjectType};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::handlers;
use crate::logger::JobLogger;
use crate::store::Store;

/// A single worker loop bound to a set of job types.
#[derive(Clone)]
pub struct Runner {
    store: Store,
    config: Arc<Config>,
    type_filter: Vec<JobType>,
}

impl Runner {
    pub fn new(store: Store, config: Arc<Config>, type_filter: Vec<JobType>) -> Runner {
        Runner {
            store,
            config,
            type_filter,
        }
    }

    /// Polls for work until the token is cancelled. An in-flight handler is
    /// always allowed to finish; cancellation only stops new work from
    /// being taken.
    pub async fn watch(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(types = ?self.type_filter, "runner watching");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self
                .store
                .pop_next_pending_job(&self.type_filter, Utc::now())
                .await
            {
                Ok(Some(job)) => {
                    self.process(job).await;
                    // Drain any backlog before sleeping again
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                Err(err) => {
                    tracing::error!("unable to pop next pending job: {err}");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
        }

        tracing::info!(types = ?self.type_filter, "runner stopped");
    }

    /// Runs a single job to completion and finalizes its status. Handler
    /// failures of any kind - including panics - become a `failed` status;
    /// nothing escapes to crash the runner.
    pub async fn process(&self, job: Job) {
        let logger = JobLogger::new(self.store.clone(), &job);
        logger
            .debug(&format!("processing {} job for {}/{}", job.job_type, job.object_type.as_str(), job.object_id))
            .await;

        let store = self.store.clone();
        let config = Arc::clone(&self.config);
        let task_job = job.clone();
        let task_logger = logger.clone();
        let outcome = tokio::spawn(async move {
            handlers::dispatch(&store, &config, &task_logger, &task_job).await
        })
        .await;

        match outcome {
            Ok(Ok(())) => self.finish_success(job, &logger).await,
            Ok(Err(err)) => {
                logger.error(&format!("job failed: {err}")).await;
                self.finish_failure(job, &logger).await;
            }
            Err(join_err) => {
                logger
                    .critical(&format!("handler aborted unexpectedly: {join_err}"))
                    .await;
                self.finish_failure(job, &logger).await;
            }
        }
    }

    /// Marks the job successful and applies the post-job workflow update:
    /// the `WorkflowStep` arg (if present) is written to the target issue,
    /// and a non-zero successor is released to `pending` with the issue's
    /// current location copied forward. All in one transaction; by this
    /// point the handler's filesystem work is committed, so failures here
    /// can only be logged loudly.
    async fn finish_success(&self, mut job: Job, logger: &JobLogger) {
        let now = Utc::now();
        job.status = JobStatus::Success;
        job.completed_at = Some(now);

        let result = self.apply_success(&job).await;
        if let Err(err) = result {
            logger
                .critical(&format!(
                    "unable to finalize successful job {}: {err}",
                    job.id
                ))
                .await;
        }
    }

    async fn apply_success(&self, job: &Job) -> Result<()> {
        let mut tx = self.store.begin().await?;
        Store::save_job_op(&mut tx, job).await?;

        // Apply the workflow-step arg and capture the issue's location for
        // the successor.
        let mut issue_location = None;
        if job.object_type == ObjectType::Issue {
            let issue = Store::find_issue_op(&mut tx, job.object_id).await?;
            let Some(mut issue) = issue else {
                return Err(EngineError::Invariant(format!(
                    "job {} references missing issue {}",
                    job.id, job.object_id
                )));
            };

            if let Some(raw) = job.arg(args::WORKFLOW_STEP) {
                let step: WorkflowStep = raw.parse()?;
                issue.workflow_step = step;
            }
            Store::save_issue_op(&mut tx, &issue).await?;
            issue_location = Some(issue.location);
        }

        if job.queue_job_id != 0 {
            let next = Store::find_job_op(&mut tx, job.queue_job_id).await?;
            let Some(mut next) = next else {
                return Err(EngineError::Invariant(format!(
                    "job {} chains to missing job {}",
                    job.id, job.queue_job_id
                )));
            };
            next.status = JobStatus::Pending;
            if let Some(location) = issue_location {
                next.location = location;
            }
            Store::save_job_op(&mut tx, &next).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Marks the job failed. The chain remainder stays `on_hold` until a
    /// human requeues.
    async fn finish_failure(&self, mut job: Job, logger: &JobLogger) {
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        if let Err(err) = self.store.save_job(&job).await {
            logger
                .critical(&format!(
                    "unable to update job status after failure (job {}): {err}",
                    job.id
                ))
                .await;
        }
    }
}

/// Clones a failed job into a fresh pending one and closes the original as
/// `failed_done`. The clone keeps the original's type, target, args and
/// successor, so the stalled chain resumes where it broke.
pub async fn requeue(store: &Store, job_id: i64) -> Result<i64> {
    let job = store
        .find_job(job_id)
        .await?
        .ok_or_else(|| EngineError::Validation(format!("no job found with id {job_id}")))?;

    if job.status != JobStatus::Failed {
        return Err(EngineError::Validation(format!(
            "cannot requeue job {job_id}: status is {} (must be {})",
            job.status,
            JobStatus::Failed
        )));
    }

    clone_job(store, job, false).await
}

/// Clones any finished job into a fresh pending one that starts a new,
/// independent chain - the successor link is cleared. The original is left
/// untouched. Only safe when the operator knows exactly what the job
/// touches.
pub async fn force_rerun(store: &Store, job_id: i64) -> Result<i64> {
    let job = store
        .find_job(job_id)
        .await?
        .ok_or_else(|| EngineError::Validation(format!("no job found with id {job_id}")))?;

    if !job.status.is_terminal() {
        return Err(EngineError::Validation(format!(
            "cannot force-rerun job {job_id}: status is {}",
            job.status
        )));
    }

    clone_job(store, job, true).await
}

async fn clone_job(store: &Store, original: Job, new_chain: bool) -> Result<i64> {
    let now = Utc::now();
    let mut clone = Job::new(original.job_type, original.args.clone(), now);
    clone.object_type = original.object_type;
    clone.object_id = original.object_id;
    clone.location = original.location.clone();
    clone.queue_job_id = if new_chain { 0 } else { original.queue_job_id };

    let mut tx = store.begin().await?;
    let saved = Store::save_job_op(&mut tx, &clone).await?;

    if !new_chain {
        let mut closed = original;
        closed.status = JobStatus::FailedDone;
        Store::save_job_op(&mut tx, &closed).await?;
    }

    tx.commit().await?;
    Ok(saved.id)
}
