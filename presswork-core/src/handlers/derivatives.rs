//! Derivative generation: hands the issue directory to the external
//! builder (JP2 images, OCR text, and whatever else the toolchain emits).

use super::{load_issue, HandlerContext};
use crate::error::{EngineError, Result};
use crate::shell;

pub async fn make_derivatives(ctx: &HandlerContext<'_>) -> Result<()> {
    let mut issue = load_issue(ctx).await?;
    if issue.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "issue {} has no on-disk location to build derivatives for",
            issue.id
        )));
    }

    ctx.logger
        .info(&format!("building derivatives for {}", issue.location))
        .await;
    shell::exec_subgroup(
        ctx.logger,
        &ctx.config.derivative_builder,
        [issue.location.clone()],
    )
    .await?;

    issue.has_derivatives = true;
    ctx.store.save_issue(&issue).await?;
    Ok(())
}
