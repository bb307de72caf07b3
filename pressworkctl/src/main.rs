//! Admin CLI for the presswork job engine: runs the queue watchers and
//! gives operators requeue / force-rerun recovery for failed jobs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use presswork_config::Config;
use presswork_core::supervisor::{Supervisor, PAGE_REVIEW_INTERVAL, STANDARD_INTERVAL};
use presswork_core::{runner, PageReviewScanner, Store};
use presswork_model::job::ALL_JOB_TYPES;
use presswork_model::JobType;

#[derive(Parser)]
#[command(name = "pressworkctl", about = "Run and administer presswork job queues")]
struct Cli {
    /// Path to the presswork settings file
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clone and close failed jobs so their chains resume
    Requeue {
        /// One or more failed job ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Watch for jobs in the given queue(s) until interrupted
    Watch {
        /// One or more queue names (job types)
        #[arg(required = true)]
        queues: Vec<String>,
    },
    /// Watch for page-review issues which have been renamed and are ready
    /// for derivatives. Run at most one of these at a time.
    WatchPageReview,
    /// Run watchers for all queues and the page review scanner in a sane
    /// configuration
    Watchall,
    /// Clone finished jobs into fresh, chain-free runs. Only safe when you
    /// know exactly what the cloned job touches.
    ForceRerun {
        /// One or more finished job ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

fn parse_queues(queues: &[String]) -> anyhow::Result<Vec<JobType>> {
    let valid: Vec<&str> = ALL_JOB_TYPES.iter().map(|t| t.as_str()).collect();
    queues
        .iter()
        .map(|q| {
            q.parse::<JobType>().map_err(|_| {
                anyhow::anyhow!(
                    "invalid job queue {q:?}; valid queue names: {}",
                    valid.join(", ")
                )
            })
        })
        .collect()
}

/// Cancels the returned token on SIGINT or SIGTERM so runners finish their
/// current handler and drain.
fn trap_signals() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(term) => term,
                Err(err) => {
                    tracing::error!("unable to install SIGTERM handler: {err}");
                    let _ = ctrl_c.await;
                    trigger.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown requested; finishing in-flight work");
        trigger.cancel();
    });
    token
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::parse(&cli.config)
        .with_context(|| format!("invalid configuration {:?}", cli.config))?;
    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("unable to open database {:?}", config.db_path))?;
    let config = Arc::new(config);

    match cli.command {
        Command::Requeue { ids } => {
            for id in ids {
                match runner::requeue(&store, id).await {
                    Ok(new_id) => tracing::info!("requeued job {id} as job {new_id}"),
                    Err(err) => tracing::error!("unable to requeue job {id}: {err}"),
                }
            }
        }
        Command::ForceRerun { ids } => {
            for id in ids {
                match runner::force_rerun(&store, id).await {
                    Ok(new_id) => tracing::info!("cloned job {id} as independent job {new_id}"),
                    Err(err) => tracing::error!("unable to force-rerun job {id}: {err}"),
                }
            }
        }
        Command::Watch { queues } => {
            let types = parse_queues(&queues)?;
            let shutdown = trap_signals();
            Supervisor::new(store, config)
                .run_types(types, STANDARD_INTERVAL, shutdown)
                .await;
        }
        Command::WatchPageReview => {
            let shutdown = trap_signals();
            PageReviewScanner::new(store)
                .watch(PAGE_REVIEW_INTERVAL, shutdown)
                .await;
        }
        Command::Watchall => {
            let shutdown = trap_signals();
            Supervisor::new(store, config).run_all(shutdown).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_requires_at_least_one_queue() {
        assert!(Cli::try_parse_from(["pressworkctl", "-c", "/etc/presswork", "watch"]).is_err());

        let cli = Cli::try_parse_from([
            "pressworkctl",
            "-c",
            "/etc/presswork",
            "watch",
            "page_split",
            "make_derivatives",
        ])
        .unwrap();
        match cli.command {
            Command::Watch { queues } => {
                let types = parse_queues(&queues).unwrap();
                assert_eq!(types, vec![JobType::PageSplit, JobType::MakeDerivatives]);
            }
            _ => panic!("expected watch command"),
        }
    }

    #[test]
    fn queue_names_are_validated() {
        let err = parse_queues(&["shrink_pdfs".to_string()]).unwrap_err();
        assert!(err.to_string().contains("valid queue names"));
    }

    #[test]
    fn requeue_parses_multiple_ids() {
        let cli = Cli::try_parse_from([
            "pressworkctl",
            "--config",
            "/etc/presswork",
            "requeue",
            "12",
            "13",
        ])
        .unwrap();
        match cli.command {
            Command::Requeue { ids } => assert_eq!(ids, vec![12, 13]),
            _ => panic!("expected requeue command"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
