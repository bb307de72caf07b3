//! The page-review scanner. Curators manually reorder and rename pages in
//! the page-review tree; this loop notices issues whose listings no longer
//! match the pristine split output and queues them for derivative
//! generation. No job drives this, so exactly one scanner may run per
//! process.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use presswork_model::Issue;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::fsutil::sorted_file_names;
use crate::queue::queue_move_issue_for_derivatives;
use crate::store::Store;

static SCANNER_ACTIVE: AtomicBool = AtomicBool::new(false);

pub struct PageReviewScanner {
    store: Store,
}

impl PageReviewScanner {
    pub fn new(store: Store) -> PageReviewScanner {
        PageReviewScanner { store }
    }

    /// Scans on the given interval until cancelled. Refuses to start if
    /// another scanner is already active in this process.
    pub async fn watch(&self, interval: Duration, shutdown: CancellationToken) {
        if SCANNER_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("page review scanner already running; refusing to start another");
            return;
        }

        tracing::info!("watching page review folders");

        loop {
            match self.scan_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("queued {n} renamed issue(s) for derivatives"),
                Err(err) => tracing::error!("page review scan failed: {err}"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        SCANNER_ACTIVE.store(false, Ordering::SeqCst);
        tracing::info!("page review scanner stopped");
    }

    /// One pass over every issue awaiting page review. Returns how many
    /// were queued.
    pub async fn scan_once(&self) -> Result<usize> {
        let issues = self.store.find_issues_in_page_review().await?;
        let mut queued = 0;

        for issue in issues {
            if !self.ready_for_derivatives(&issue).await? {
                continue;
            }

            tracing::info!(
                issue = issue.id,
                location = %issue.location,
                "issue pages renamed; queueing derivative build"
            );
            queue_move_issue_for_derivatives(&self.store, &issue).await?;
            queued += 1;
        }

        Ok(queued)
    }

    async fn ready_for_derivatives(&self, issue: &Issue) -> Result<bool> {
        if issue.location.is_empty() {
            return Ok(false);
        }
        let dir = Path::new(&issue.location);
        if !dir.is_dir() {
            return Ok(false);
        }

        let names = sorted_file_names(dir)?;
        if names.is_empty() || is_pristine_split(&names) {
            return Ok(false);
        }

        // Don't re-queue an issue that already has live work in flight
        let jobs = self.store.find_jobs_for_issue(issue.id).await?;
        if jobs.iter().any(|j| !j.status.is_terminal()) {
            return Ok(false);
        }

        Ok(true)
    }
}

/// True when the listing is exactly the untouched split output:
/// `seq-0001.pdf` through `seq-NNNN.pdf` with no gaps and nothing else.
fn is_pristine_split(names: &[String]) -> bool {
    names
        .iter()
        .enumerate()
        .all(|(idx, name)| *name == format!("seq-{:04}.pdf", idx + 1))
}
