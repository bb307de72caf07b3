use std::fmt;

use presswork_model::{Job, JobType};

use crate::store::Store;

/// Job log severities. `Critical` marks failures discovered after the
/// filesystem has already committed - the job log line is all an operator
/// gets, so these must never be dropped silently.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRIT",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job-scoped logger. Every line goes to the process log via `tracing`
/// and is appended to the `job_logs` table so the UI can show an issue's
/// history long after stderr has scrolled away.
#[derive(Clone, Debug)]
pub struct JobLogger {
    store: Store,
    job_id: i64,
    job_type: JobType,
}

impl JobLogger {
    pub fn new(store: Store, job: &Job) -> JobLogger {
        JobLogger {
            store,
            job_id: job.id,
            job_type: job.job_type,
        }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub async fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => {
                tracing::debug!(job = self.job_id, kind = %self.job_type, "{message}")
            }
            LogLevel::Info => {
                tracing::info!(job = self.job_id, kind = %self.job_type, "{message}")
            }
            LogLevel::Warn => {
                tracing::warn!(job = self.job_id, kind = %self.job_type, "{message}")
            }
            LogLevel::Error | LogLevel::Critical => {
                tracing::error!(job = self.job_id, kind = %self.job_type, level = %level, "{message}")
            }
        }

        if let Err(err) = self
            .store
            .append_job_log(self.job_id, level.as_str(), message)
            .await
        {
            tracing::error!(
                job = self.job_id,
                "unable to write job log entry: {err}"
            );
        }
    }

    pub async fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message).await;
    }

    pub async fn info(&self, message: &str) {
        self.log(LogLevel::Info, message).await;
    }

    pub async fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message).await;
    }

    pub async fn error(&self, message: &str) {
        self.log(LogLevel::Error, message).await;
    }

    pub async fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message).await;
    }
}
