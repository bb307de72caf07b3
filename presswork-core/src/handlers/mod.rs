//! The job handler catalog. One handler per job type; `dispatch` is the
//! registry. Adding a type means one match arm here plus a handler
//! function.
//!
//! Handlers are restart-safe: every step either completes entirely or
//! leaves a detectable pre-state the handler refuses (an existing final
//! directory halts rather than clobbers).

mod archive;
mod bagit;
mod batch;
mod derivatives;
mod dirops;
mod mets;
mod move_issue;
mod page_split;
mod set_fields;

use presswork_config::Config;
use presswork_model::{Batch, Issue, Job, JobType, ObjectType};

use crate::error::{EngineError, Result};
use crate::logger::JobLogger;
use crate::store::Store;

/// Everything a handler gets to work with. Handlers mutate the filesystem
/// and save their own entity changes; the runner applies the workflow-step
/// arg and releases the successor afterward.
pub struct HandlerContext<'a> {
    pub store: &'a Store,
    pub config: &'a Config,
    pub logger: &'a JobLogger,
    pub job: &'a Job,
}

/// Runs the handler for the job's type. Errors never cross the runner
/// boundary as anything but a `failed` status.
pub async fn dispatch(
    store: &Store,
    config: &Config,
    logger: &JobLogger,
    job: &Job,
) -> Result<()> {
    let ctx = HandlerContext {
        store,
        config,
        logger,
        job,
    };

    match job.job_type {
        JobType::SetIssueWorkflowStep => set_fields::set_issue_workflow_step(&ctx).await,
        JobType::SetIssueMasterBackupLocation => {
            set_fields::set_issue_master_backup_location(&ctx).await
        }
        JobType::SetIssueLocation => set_fields::set_issue_location(&ctx).await,
        JobType::SetBatchStatus => set_fields::set_batch_status(&ctx).await,
        JobType::SetBatchLocation => set_fields::set_batch_location(&ctx).await,
        JobType::PageSplit => page_split::page_split(&ctx).await,
        JobType::MoveIssueToWorkflow => move_issue::move_issue_to_workflow(&ctx).await,
        JobType::MoveIssueToPageReview => move_issue::move_issue_to_page_review(&ctx).await,
        JobType::MakeDerivatives => derivatives::make_derivatives(&ctx).await,
        JobType::BuildMets => mets::build_mets(&ctx).await,
        JobType::ArchiveMasterFiles => archive::archive_master_files(&ctx).await,
        JobType::CreateBatchStructure => batch::create_batch_structure(&ctx).await,
        JobType::MakeBatchXml => batch::make_batch_xml(&ctx).await,
        JobType::WriteBagitManifest => bagit::write_bagit_manifest(&ctx).await,
        JobType::SyncDirectory => dirops::sync_directory(&ctx).await,
        JobType::DeleteDirectory => dirops::delete_directory(&ctx).await,
        JobType::RenameDirectory => dirops::rename_directory(&ctx).await,
    }
}

/// Fetches the job's target issue, deriving and persisting its human name
/// on first use so every handler sees consistent directory naming.
pub(crate) async fn load_issue(ctx: &HandlerContext<'_>) -> Result<Issue> {
    if ctx.job.object_type != ObjectType::Issue {
        return Err(EngineError::Invariant(format!(
            "job {} is not an issue job",
            ctx.job.id
        )));
    }

    let mut issue = ctx
        .store
        .find_issue(ctx.job.object_id)
        .await?
        .ok_or_else(|| {
            EngineError::Invariant(format!(
                "job {} references missing issue {}",
                ctx.job.id, ctx.job.object_id
            ))
        })?;

    if issue.human_name.is_empty() {
        issue.human_name();
        issue = ctx.store.save_issue(&issue).await?;
    }

    Ok(issue)
}

/// Fetches the job's target batch.
pub(crate) async fn load_batch(ctx: &HandlerContext<'_>) -> Result<Batch> {
    if ctx.job.object_type != ObjectType::Batch {
        return Err(EngineError::Invariant(format!(
            "job {} is not a batch job",
            ctx.job.id
        )));
    }

    ctx.store
        .find_batch(ctx.job.object_id)
        .await?
        .ok_or_else(|| {
            EngineError::Invariant(format!(
                "job {} references missing batch {}",
                ctx.job.id, ctx.job.object_id
            ))
        })
}

/// A declared argument. Present-but-empty is legal (e.g. clearing a
/// location); missing is a validation failure.
pub(crate) fn require_arg<'a>(job: &'a Job, key: &str) -> Result<&'a str> {
    job.arg(key).ok_or_else(|| {
        EngineError::Validation(format!("job {} is missing the {key} arg", job.id))
    })
}
