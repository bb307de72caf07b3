//! Splits a publisher's uploaded issue into one PDF/A per page.
//!
//! Page-level work happens in throwaway temp locations; the issue
//! directory is only touched once every page has been produced. After the
//! staged pages exist, the remaining steps (backing up the originals and
//! swapping the new pages into place) are past the point of no return:
//! failures there are logged as critical and the job still succeeds, since
//! half of the transition has already hit the disk.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{load_issue, HandlerContext};
use crate::error::{EngineError, Result};
use crate::fsutil::{
    copy_directory, must_not_exist, sorted_files, verify_backup, wip_name,
};
use crate::shell;

static SPLIT_PAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^seq-(\d+)\.pdf$").unwrap_or_else(|e| panic!("split page regex: {e}"))
});

pub async fn page_split(ctx: &HandlerContext<'_>) -> Result<()> {
    let mut issue = load_issue(ctx).await?;
    if issue.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "issue {} has no on-disk location to split",
            issue.id
        )));
    }

    let human = issue.human_name.clone();
    let location = Path::new(&issue.location).to_path_buf();
    let location_parent = location.parent().ok_or_else(|| {
        EngineError::Invariant(format!("issue location {location:?} has no parent"))
    })?;

    let wip_dir = location_parent.join(wip_name(&human));
    let master_backup = ctx.config.master_backup_path.join(&human);
    must_not_exist(&wip_dir)?;
    must_not_exist(&master_backup)?;

    let master_file = tempfile::Builder::new()
        .prefix("splitter-master-")
        .suffix(".pdf")
        .tempfile()?;
    let pages_dir = tempfile::Builder::new()
        .prefix("splitter-pages-")
        .tempdir()?;

    ctx.logger
        .debug(&format!("processing issue {} ({human})", issue.id))
        .await;

    create_master_pdf(ctx, &location, master_file.path()).await?;
    split_pages(ctx, master_file.path(), pages_dir.path()).await?;

    let pages = rename_sequence(pages_dir.path(), ctx.config.minimum_issue_pages)?;
    ctx.logger.info(&format!("split into {pages} pages")).await;

    convert_to_pdfa(ctx, pages_dir.path()).await?;

    ctx.logger.info("staging split pages").await;
    copy_directory(pages_dir.path(), &wip_dir)?;

    // Past the point of no return: the staged pages exist, so everything
    // from here on logs critically rather than failing the job.
    if let Err(err) = swap_in_pages(&location, &wip_dir, &master_backup) {
        ctx.logger
            .critical(&format!(
                "unable to finish page swap for issue {}: {err}",
                issue.id
            ))
            .await;
        return Ok(());
    }

    issue.master_backup_location = master_backup.to_string_lossy().into_owned();
    if let Err(err) = ctx.store.save_issue(&issue).await {
        ctx.logger
            .critical(&format!(
                "unable to record master backup for issue {}: {err}",
                issue.id
            ))
            .await;
    }

    Ok(())
}

/// Combines and pre-processes the uploaded PDFs with ghostscript, which
/// copes with files that crash the poppler utilities.
async fn create_master_pdf(
    ctx: &HandlerContext<'_>,
    location: &Path,
    master: &Path,
) -> Result<()> {
    ctx.logger.debug("preprocessing with ghostscript").await;

    let inputs = sorted_files(location)?;
    if inputs.is_empty() {
        return Err(EngineError::Precondition(format!(
            "no source files in {}",
            location.display()
        )));
    }

    let mut gs_args: Vec<String> = vec![
        "-sDEVICE=pdfwrite".into(),
        "-dCompatibilityLevel=1.6".into(),
        "-dPDFSETTINGS=/default".into(),
        "-dNOPAUSE".into(),
        "-dQUIET".into(),
        "-dBATCH".into(),
        "-dDetectDuplicateImages".into(),
        "-dCompressFonts=true".into(),
        "-r150".into(),
        format!("-sOutputFile={}", master.display()),
    ];
    gs_args.extend(inputs.iter().map(|p| p.display().to_string()));

    shell::exec_subgroup(ctx.logger, &ctx.config.ghostscript, &gs_args).await
}

/// Produces exactly one PDF per page.
async fn split_pages(ctx: &HandlerContext<'_>, master: &Path, pages_dir: &Path) -> Result<()> {
    ctx.logger.info("splitting PDF(s)").await;
    let pattern = pages_dir.join("seq-%d.pdf");
    shell::exec_subgroup(
        ctx.logger,
        &ctx.config.pdf_separate,
        [master.display().to_string(), pattern.display().to_string()],
    )
    .await
}

/// Renames split pages to zero-padded `seq-NNNN.pdf` so they sort, failing
/// on too few pages or anything that doesn't match the split pattern.
pub(crate) fn rename_sequence(dir: &Path, min_pages: usize) -> Result<usize> {
    let names = crate::fsutil::sorted_file_names(dir)?;

    if names.len() < min_pages {
        return Err(EngineError::Validation(format!(
            "too few pages to continue processing (found {}, need {} or more)",
            names.len(),
            min_pages
        )));
    }

    for name in &names {
        let captures = SPLIT_PAGE_NAME.captures(name).ok_or_else(|| {
            EngineError::Validation(format!(
                "file {name:?} doesn't match the expected pdf page pattern"
            ))
        })?;
        let page_num: u32 = captures[1].parse().map_err(|_| {
            EngineError::Validation(format!("unable to parse page number from {name:?}"))
        })?;

        let renamed = format!("seq-{page_num:04}.pdf");
        if *name != renamed {
            fs::rename(dir.join(name), dir.join(renamed))?;
        }
    }

    Ok(names.len())
}

/// Converts every staged page to PDF/A in place.
async fn convert_to_pdfa(ctx: &HandlerContext<'_>, pages_dir: &Path) -> Result<()> {
    ctx.logger.info("converting pages to PDF/A").await;

    for page in sorted_files(pages_dir)? {
        let pdfa = {
            let mut os = page.clone().into_os_string();
            os.push(".a");
            std::path::PathBuf::from(os)
        };

        shell::exec_subgroup(
            ctx.logger,
            &ctx.config.ghostscript,
            [
                "-dPDFA=2".to_string(),
                "-dBATCH".to_string(),
                "-dNOPAUSE".to_string(),
                "-sProcessColorModel=DeviceCMYK".to_string(),
                "-sDEVICE=pdfwrite".to_string(),
                "-sPDFACompatibilityPolicy=1".to_string(),
                format!("-sOutputFile={}", pdfa.display()),
                page.display().to_string(),
            ],
        )
        .await?;

        fs::rename(&pdfa, &page)?;
    }

    Ok(())
}

/// Moves the originals into the master backup (verifying the backup before
/// the source is destroyed) and renames the staged pages into the issue
/// location.
fn swap_in_pages(location: &Path, wip_dir: &Path, master_backup: &Path) -> Result<()> {
    if let Some(parent) = master_backup.parent() {
        fs::create_dir_all(parent)?;
    }
    copy_directory(location, master_backup)?;
    verify_backup(location, master_backup)?;
    fs::remove_dir_all(location)?;
    fs::rename(wip_dir, location)?;
    Ok(())
}
