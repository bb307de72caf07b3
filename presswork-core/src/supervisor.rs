//! Boots the standard set of runners so the whole system operates with one
//! command. Pools are partitioned so disk-heavy, CPU-heavy and
//! near-real-time jobs never starve one another.

use std::sync::Arc;
use std::time::Duration;

use presswork_config::Config;
use presswork_model::JobType;
use tokio_util::sync::CancellationToken;

use crate::runner::Runner;
use crate::scanner::PageReviewScanner;
use crate::store::Store;

/// Polling interval for the disk, CPU and light pools.
pub const STANDARD_INTERVAL: Duration = Duration::from_secs(10);
/// The set-field pool polls every second for near-real-time UI feedback.
pub const FAST_INTERVAL: Duration = Duration::from_secs(1);
/// The page-review scanner only needs to notice human activity.
pub const PAGE_REVIEW_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Jobs which are exclusively disk IO, kept together to limit concurrent
/// filesystem churn.
pub const DISK_POOL: [JobType; 4] = [
    JobType::ArchiveMasterFiles,
    JobType::SyncDirectory,
    JobType::DeleteDirectory,
    JobType::WriteBagitManifest,
];

/// CPU-bound jobs, grouped so they aren't fighting each other for cores.
pub const CPU_POOL: [JobType; 2] = [JobType::PageSplit, JobType::MakeDerivatives];

/// Fast-but-not-instant jobs: renames, hard-linking, small template
/// output.
pub const LIGHT_POOL: [JobType; 4] = [
    JobType::BuildMets,
    JobType::CreateBatchStructure,
    JobType::MakeBatchXml,
    JobType::RenameDirectory,
];

/// The near-real-time field setters.
pub const FAST_POOL: [JobType; 5] = [
    JobType::SetIssueWorkflowStep,
    JobType::SetIssueMasterBackupLocation,
    JobType::SetIssueLocation,
    JobType::SetBatchStatus,
    JobType::SetBatchLocation,
];

pub struct Supervisor {
    store: Store,
    config: Arc<Config>,
}

impl Supervisor {
    pub fn new(store: Store, config: Arc<Config>) -> Supervisor {
        Supervisor { store, config }
    }

    /// Runs every pool plus the page-review scanner until the token is
    /// cancelled, then waits for all in-flight handlers to finish before
    /// returning.
    pub async fn run_all(&self, shutdown: CancellationToken) {
        let mut handles = Vec::new();

        for (types, interval) in [
            (DISK_POOL.to_vec(), STANDARD_INTERVAL),
            (CPU_POOL.to_vec(), STANDARD_INTERVAL),
            (LIGHT_POOL.to_vec(), STANDARD_INTERVAL),
            (FAST_POOL.to_vec(), FAST_INTERVAL),
        ] {
            handles.push(self.spawn_runner(types, interval, shutdown.clone()));
        }

        let scanner = PageReviewScanner::new(self.store.clone());
        let scanner_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            scanner.watch(PAGE_REVIEW_INTERVAL, scanner_shutdown).await;
        }));

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!("worker task failed during shutdown: {err}");
            }
        }

        tracing::info!("supervisor drained; all runners stopped");
    }

    /// Runs a single runner over an explicit type filter, for the granular
    /// `watch` command.
    pub async fn run_types(
        &self,
        types: Vec<JobType>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        let handle = self.spawn_runner(types, interval, shutdown);
        if let Err(err) = handle.await {
            tracing::warn!("runner task failed: {err}");
        }
    }

    fn spawn_runner(
        &self,
        types: Vec<JobType>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let runner = Runner::new(self.store.clone(), Arc::clone(&self.config), types);
        tokio::spawn(async move {
            runner.watch(interval, shutdown).await;
        })
    }
}
