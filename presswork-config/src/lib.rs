//! Configuration loading for the presswork curation engine.
//!
//! Settings live in a dotenv-format `KEY=value` file (the same format the
//! deployment's provisioning scripts source), read at startup and validated
//! before anything touches the queue. Path settings must point at existing
//! directories; tool settings default to bare binary names resolved via
//! `PATH`.

mod loader;

pub use loader::{ConfigError, Result};

use std::path::{Path, PathBuf};

/// Fallback for `MINIMUM_ISSUE_PAGES` when the setting is absent.
pub const DEFAULT_MINIMUM_ISSUE_PAGES: usize = 2;

/// Everything the engine needs to know about its environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database file backing the store.
    pub db_path: PathBuf,

    /// Path to the ghostscript binary for PDF processing.
    pub ghostscript: PathBuf,
    /// Path to the pdfseparate binary for page splitting.
    pub pdf_separate: PathBuf,
    /// External derivative builder invoked over an issue directory.
    pub derivative_builder: PathBuf,

    /// Org code stamped onto sftp-uploaded batches.
    pub pdf_batch_marc_org_code: String,

    /// Root under which in-workflow issue directories live.
    pub workflow_path: PathBuf,
    /// Root for issues awaiting manual page review.
    pub page_review_path: PathBuf,
    /// Root for master PDF backups (born-digital only).
    pub master_backup_path: PathBuf,
    /// Root under which finished batches are assembled.
    pub batch_output_path: PathBuf,

    /// Page count below which a split refuses to process an issue.
    pub minimum_issue_pages: usize,
}

impl Config {
    /// Reads and validates the given settings file.
    pub fn parse(path: &Path) -> Result<Config> {
        loader::parse(path)
    }
}
