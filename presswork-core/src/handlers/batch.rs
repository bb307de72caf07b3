//! Batch assembly: the on-disk layout downstream ingest tools expect, plus
//! the batch XML. Both run while the batch still lives under its `.wip-`
//! directory; a later chain link renames it into place.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use super::{load_batch, require_arg, HandlerContext};
use crate::error::{EngineError, Result};
use crate::fsutil::{link_or_copy, must_not_exist, write_atomic};
use presswork_model::job::args;
use presswork_model::{Batch, Issue};

/// Builds `<location>/data/<lccn>/print/<issue>/` for every linked issue,
/// hard-linking the issue files in. The location arg is the batch's WIP
/// directory, so nothing here is visible until the later rename.
pub async fn create_batch_structure(ctx: &HandlerContext<'_>) -> Result<()> {
    let batch = load_batch(ctx).await?;
    let location = require_arg(ctx.job, args::LOCATION)?;
    if location.is_empty() {
        return Err(EngineError::Validation(format!(
            "job {} has an empty batch location",
            ctx.job.id
        )));
    }

    let root = Path::new(location);
    must_not_exist(root)?;

    let issues = ctx.store.find_issues_by_batch(batch.id).await?;
    if issues.is_empty() {
        return Err(EngineError::Validation(format!(
            "batch {} has no linked issues",
            batch.id
        )));
    }

    for issue in &issues {
        link_issue_into_batch(root, issue)?;
    }

    ctx.logger
        .info(&format!(
            "built batch structure for {} issue(s) under {}",
            issues.len(),
            root.display()
        ))
        .await;
    Ok(())
}

fn link_issue_into_batch(root: &Path, issue: &Issue) -> Result<()> {
    if issue.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "issue {} is not on disk; cannot batch it",
            issue.id
        )));
    }

    let source = Path::new(&issue.location);
    let dest = root
        .join("data")
        .join(&issue.lccn)
        .join("print")
        .join(&issue.human_name);

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| EngineError::Io(e.into()))?;
        let rel = entry.path().strip_prefix(source).map_err(|e| {
            EngineError::Invariant(format!("walk escaped {}: {e}", source.display()))
        })?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            link_or_copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Emits `batch.xml` listing every issue in the batch.
pub async fn make_batch_xml(ctx: &HandlerContext<'_>) -> Result<()> {
    let batch = load_batch(ctx).await?;
    if batch.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "batch {} has no on-disk location",
            batch.id
        )));
    }

    let issues = ctx.store.find_issues_by_batch(batch.id).await?;
    let xml = render_batch_xml(&batch, &issues);
    let out = Path::new(&batch.location).join("batch.xml");
    ctx.logger
        .info(&format!("writing {}", out.display()))
        .await;
    write_atomic(&out, xml.as_bytes())?;
    Ok(())
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn render_batch_xml(batch: &Batch, issues: &[Issue]) -> String {
    let mut entries = String::new();
    for issue in issues {
        entries.push_str(&format!(
            "  <issue lccn=\"{}\" issueDate=\"{}\" editionOrder=\"{:02}\">data/{}/print/{}/{}.xml</issue>\n",
            xml_escape(&issue.lccn),
            xml_escape(&issue.date),
            issue.edition,
            xml_escape(&issue.lccn),
            xml_escape(&issue.human_name),
            xml_escape(&issue.human_name),
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<batch name=\"{}\" awardee=\"{}\" awardee_name=\"\">\n{}</batch>\n",
        xml_escape(&batch.full_name().to_string()),
        xml_escape(&batch.marc_org_code),
        entries,
    )
}
