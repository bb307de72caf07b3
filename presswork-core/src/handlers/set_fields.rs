//! The near-real-time field setters. These run on the fast pool so the UI
//! reflects state changes within about a second.

use presswork_model::job::args;
use presswork_model::workflow::WorkflowStep;
use presswork_model::BatchStatus;

use super::{load_batch, load_issue, require_arg, HandlerContext};
use crate::error::Result;

/// The step itself is applied by the post-job workflow update, which reads
/// the `WorkflowStep` arg off any successful issue job. This handler only
/// proves the arg parses so a bad chain fails before mutating anything.
pub async fn set_issue_workflow_step(ctx: &HandlerContext<'_>) -> Result<()> {
    load_issue(ctx).await?;
    require_arg(ctx.job, args::WORKFLOW_STEP)?.parse::<WorkflowStep>()?;
    Ok(())
}

pub async fn set_issue_master_backup_location(ctx: &HandlerContext<'_>) -> Result<()> {
    let mut issue = load_issue(ctx).await?;
    issue.master_backup_location = require_arg(ctx.job, args::LOCATION)?.to_string();
    ctx.store.save_issue(&issue).await?;
    Ok(())
}

pub async fn set_issue_location(ctx: &HandlerContext<'_>) -> Result<()> {
    let mut issue = load_issue(ctx).await?;
    issue.location = require_arg(ctx.job, args::LOCATION)?.to_string();
    ctx.store.save_issue(&issue).await?;
    Ok(())
}

pub async fn set_batch_status(ctx: &HandlerContext<'_>) -> Result<()> {
    let mut batch = load_batch(ctx).await?;
    batch.status = require_arg(ctx.job, args::BATCH_STATUS)?.parse::<BatchStatus>()?;
    ctx.store.save_batch(&batch).await?;
    Ok(())
}

pub async fn set_batch_location(ctx: &HandlerContext<'_>) -> Result<()> {
    let mut batch = load_batch(ctx).await?;
    batch.location = require_arg(ctx.job, args::LOCATION)?.to_string();
    ctx.store.save_batch(&batch).await?;
    Ok(())
}
