//! Plain directory operations used as chain links: sync, delete, rename.

use std::fs;
use std::path::Path;

use super::{require_arg, HandlerContext};
use crate::error::{EngineError, Result};
use crate::fsutil::{copy_directory_over, must_not_exist};
use presswork_model::job::args;

/// Recursive copy from `Source` into `Destination`, creating directories
/// as needed and overwriting files already present.
pub async fn sync_directory(ctx: &HandlerContext<'_>) -> Result<()> {
    let source = require_arg(ctx.job, args::SOURCE)?;
    let dest = require_arg(ctx.job, args::DESTINATION)?;

    ctx.logger
        .info(&format!("syncing {source:?} to {dest:?}"))
        .await;
    copy_directory_over(Path::new(source), Path::new(dest))
}

/// Recursive removal of `Location`. Idempotent: an already-gone directory
/// is a success, so a crashed-and-requeued delete converges.
pub async fn delete_directory(ctx: &HandlerContext<'_>) -> Result<()> {
    let location = require_arg(ctx.job, args::LOCATION)?;
    if location.is_empty() {
        ctx.logger.info("no directory to delete").await;
        return Ok(());
    }

    let path = Path::new(location);
    if !path.is_absolute() {
        return Err(EngineError::Validation(format!(
            "refusing to delete relative path {location:?}"
        )));
    }
    if path.parent().is_none() {
        return Err(EngineError::Validation(format!(
            "refusing to delete filesystem root {location:?}"
        )));
    }

    if path.exists() {
        ctx.logger.info(&format!("removing {location:?}")).await;
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// `Source` to `Destination` rename; halts if the destination exists.
pub async fn rename_directory(ctx: &HandlerContext<'_>) -> Result<()> {
    let source = require_arg(ctx.job, args::SOURCE)?;
    let dest = require_arg(ctx.job, args::DESTINATION)?;

    let source_path = Path::new(source);
    let dest_path = Path::new(dest);
    if !source_path.exists() {
        return Err(EngineError::Precondition(format!(
            "rename source {source:?} is missing"
        )));
    }
    must_not_exist(dest_path)?;

    ctx.logger
        .info(&format!("renaming {source:?} to {dest:?}"))
        .await;
    fs::rename(source_path, dest_path)?;
    Ok(())
}
