//! Issue directory moves between workflow trees. The copy lands in a
//! hidden `.wip-` directory first and is renamed into place only after the
//! source is cleaned up, so observers never see a partial issue.

use std::fs;
use std::path::Path;

use super::{load_issue, HandlerContext};
use crate::error::{EngineError, Result};
use crate::fsutil::{copy_directory, must_not_exist, wip_name};

pub async fn move_issue_to_workflow(ctx: &HandlerContext<'_>) -> Result<()> {
    move_issue(ctx, &ctx.config.workflow_path).await
}

pub async fn move_issue_to_page_review(ctx: &HandlerContext<'_>) -> Result<()> {
    move_issue(ctx, &ctx.config.page_review_path).await
}

async fn move_issue(ctx: &HandlerContext<'_>, root: &Path) -> Result<()> {
    let mut issue = load_issue(ctx).await?;
    if issue.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "issue {} has no on-disk location to move",
            issue.id
        )));
    }

    let human = issue.human_name.clone();
    let old_location = issue.location.clone();
    let new_location = root.join(&human);
    must_not_exist(&new_location)?;

    let wip_location = root.join(wip_name(&human));
    must_not_exist(&wip_location)?;

    ctx.logger
        .info(&format!("copying {old_location:?} to {wip_location:?}"))
        .await;
    copy_directory(Path::new(&old_location), &wip_location)?;
    fs::remove_dir_all(&old_location)?;
    fs::rename(&wip_location, &new_location)?;

    // Non-curation tools need to read the moved issue
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&new_location, fs::Permissions::from_mode(0o755))?;
    }

    // The move is done; a failure recording it can only be logged loudly
    issue.location = new_location.to_string_lossy().into_owned();
    if let Err(err) = ctx.store.save_issue(&issue).await {
        ctx.logger
            .critical(&format!(
                "unable to update issue {} location after move: {err}",
                issue.id
            ))
            .await;
    }

    Ok(())
}
