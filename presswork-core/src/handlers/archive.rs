//! Pulls the issue's master PDFs out of the backup area and into the issue
//! directory under `master/`, so the batch carries the born-digital
//! originals alongside the derivatives.

use std::fs;
use std::path::Path;

use super::{load_issue, HandlerContext};
use crate::error::{EngineError, Result};
use crate::fsutil::{link_or_copy, must_not_exist, sorted_files};

pub async fn archive_master_files(ctx: &HandlerContext<'_>) -> Result<()> {
    let issue = load_issue(ctx).await?;

    // Scanned issues have no master backups; nothing to archive.
    if issue.master_backup_location.is_empty() {
        ctx.logger
            .info(&format!("issue {} has no master backup; skipping", issue.id))
            .await;
        return Ok(());
    }

    if issue.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "issue {} has no on-disk location to archive masters into",
            issue.id
        )));
    }

    let backup = Path::new(&issue.master_backup_location);
    if !backup.is_dir() {
        return Err(EngineError::Precondition(format!(
            "master backup {} is missing",
            backup.display()
        )));
    }

    let dest = Path::new(&issue.location).join("master");
    must_not_exist(&dest)?;
    fs::create_dir(&dest)?;

    for file in sorted_files(backup)? {
        let name = file.file_name().ok_or_else(|| {
            EngineError::Invariant(format!("{} has no file name", file.display()))
        })?;
        link_or_copy(&file, &dest.join(name))?;
    }

    ctx.logger
        .info(&format!("archived master files into {}", dest.display()))
        .await;
    Ok(())
}
