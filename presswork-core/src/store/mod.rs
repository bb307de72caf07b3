//! Transactional storage for issues, batches, jobs and their logs.
//!
//! Everything goes through one `Store` handle wrapping a SQLite pool.
//! Row-to-struct mapping is done by hand so the model crate stays free of
//! persistence concerns; the mapping functions are the single place wire
//! strings get parsed back into enums.

mod rows;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, Transaction};

use presswork_model::{AuditLog, Batch, Issue, Job, JobLog, JobStatus, JobType, WorkflowStep};

use crate::error::Result;
use rows::{batch_from_row, issue_from_row, job_from_row};

/// Embedded schema migrations, applied on open.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const ISSUE_COLUMNS: &str = "id, marc_org_code, lccn, date, date_as_labeled, volume, \
     issue_number, edition, edition_label, page_labels_csv, batch_id, error, location, \
     master_backup_location, human_name, is_from_scanner, has_derivatives, workflow_step, \
     workflow_owner_id, workflow_owner_expires_at, metadata_entry_user_id, \
     reviewed_by_user_id, metadata_approved_at, rejection_notes, rejected_by_user_id";

const BATCH_COLUMNS: &str = "id, marc_org_code, name, version, created_at, status, location";

const JOB_COLUMNS: &str = "id, created_at, started_at, completed_at, job_type, object_type, \
     object_id, status, run_at, extra_data, location, queue_job_id";

/// Handle to the persistent store. Cheap to clone; all clones share one
/// pool.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if necessary) the database file and applies
    /// migrations.
    pub async fn open(path: &Path) -> Result<Store> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(Store { pool })
    }

    /// An in-memory store for tests. Pinned to a single connection so the
    /// database survives as long as the pool does.
    pub async fn open_in_memory() -> Result<Store> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(Store { pool })
    }

    /// Wraps an existing pool (used by `#[sqlx::test]` fixtures).
    pub fn from_pool(pool: SqlitePool) -> Store {
        Store { pool }
    }

    /// Direct pool access, for collaborators with their own queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Begins a transaction for multi-statement operations.
    pub async fn begin(&self) -> Result<Transaction<'static, sqlx::Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ------------------------------------------------------------------
    // Issues

    pub async fn find_issue(&self, id: i64) -> Result<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| issue_from_row(&r)).transpose()
    }

    pub async fn find_issue_op(conn: &mut SqliteConnection, id: i64) -> Result<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
        row.map(|r| issue_from_row(&r)).transpose()
    }

    pub async fn find_issues_by_batch(&self, batch_id: i64) -> Result<Vec<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE batch_id = ? ORDER BY id");
        let rows = sqlx::query(&sql).bind(batch_id).fetch_all(&self.pool).await?;
        rows.iter().map(issue_from_row).collect()
    }

    /// All issues on the given user's desk: claimed and not yet expired.
    pub async fn find_issues_on_desk(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues \
             WHERE workflow_owner_id = ? \
               AND workflow_owner_expires_at IS NOT NULL \
               AND workflow_owner_expires_at > ? \
             ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(issue_from_row).collect()
    }

    /// All issues at the given step which are claimable: unowned or with a
    /// lapsed claim, and not flagged with an error. Expiry needs no write -
    /// the predicate alone flips membership.
    pub async fn find_available_issues_by_step(
        &self,
        step: WorkflowStep,
        now: DateTime<Utc>,
    ) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues \
             WHERE workflow_step = ? \
               AND (workflow_owner_id = 0 \
                    OR workflow_owner_expires_at IS NULL \
                    OR workflow_owner_expires_at <= ?) \
               AND error = '' \
             ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(step.as_str())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(issue_from_row).collect()
    }

    pub async fn find_issues_in_page_review(&self) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE workflow_step = ? ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(WorkflowStep::AwaitingPageReview.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(issue_from_row).collect()
    }

    /// Creates or updates the issue, returning it with its id filled in.
    pub async fn save_issue(&self, issue: &Issue) -> Result<Issue> {
        let mut conn = self.pool.acquire().await?;
        Self::save_issue_op(&mut conn, issue).await
    }

    pub async fn save_issue_op(conn: &mut SqliteConnection, issue: &Issue) -> Result<Issue> {
        let mut saved = issue.clone();
        let labels_csv = issue.page_labels.join(",");

        if issue.id == 0 {
            let res = sqlx::query(
                "INSERT INTO issues (marc_org_code, lccn, date, date_as_labeled, volume, \
                 issue_number, edition, edition_label, page_labels_csv, batch_id, error, \
                 location, master_backup_location, human_name, is_from_scanner, \
                 has_derivatives, workflow_step, workflow_owner_id, workflow_owner_expires_at, \
                 metadata_entry_user_id, reviewed_by_user_id, metadata_approved_at, \
                 rejection_notes, rejected_by_user_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&issue.marc_org_code)
            .bind(&issue.lccn)
            .bind(&issue.date)
            .bind(&issue.date_as_labeled)
            .bind(&issue.volume)
            .bind(&issue.issue_number)
            .bind(issue.edition)
            .bind(&issue.edition_label)
            .bind(&labels_csv)
            .bind(issue.batch_id)
            .bind(&issue.error)
            .bind(&issue.location)
            .bind(&issue.master_backup_location)
            .bind(&issue.human_name)
            .bind(issue.is_from_scanner)
            .bind(issue.has_derivatives)
            .bind(issue.workflow_step.as_str())
            .bind(issue.workflow_owner_id)
            .bind(issue.workflow_owner_expires_at)
            .bind(issue.metadata_entry_user_id)
            .bind(issue.reviewed_by_user_id)
            .bind(issue.metadata_approved_at)
            .bind(&issue.rejection_notes)
            .bind(issue.rejected_by_user_id)
            .execute(&mut *conn)
            .await?;
            saved.id = res.last_insert_rowid();
        } else {
            sqlx::query(
                "UPDATE issues SET marc_org_code = ?, lccn = ?, date = ?, \
                 date_as_labeled = ?, volume = ?, issue_number = ?, edition = ?, \
                 edition_label = ?, page_labels_csv = ?, batch_id = ?, error = ?, \
                 location = ?, master_backup_location = ?, human_name = ?, \
                 is_from_scanner = ?, has_derivatives = ?, workflow_step = ?, \
                 workflow_owner_id = ?, workflow_owner_expires_at = ?, \
                 metadata_entry_user_id = ?, reviewed_by_user_id = ?, \
                 metadata_approved_at = ?, rejection_notes = ?, rejected_by_user_id = ? \
                 WHERE id = ?",
            )
            .bind(&issue.marc_org_code)
            .bind(&issue.lccn)
            .bind(&issue.date)
            .bind(&issue.date_as_labeled)
            .bind(&issue.volume)
            .bind(&issue.issue_number)
            .bind(issue.edition)
            .bind(&issue.edition_label)
            .bind(&labels_csv)
            .bind(issue.batch_id)
            .bind(&issue.error)
            .bind(&issue.location)
            .bind(&issue.master_backup_location)
            .bind(&issue.human_name)
            .bind(issue.is_from_scanner)
            .bind(issue.has_derivatives)
            .bind(issue.workflow_step.as_str())
            .bind(issue.workflow_owner_id)
            .bind(issue.workflow_owner_expires_at)
            .bind(issue.metadata_entry_user_id)
            .bind(issue.reviewed_by_user_id)
            .bind(issue.metadata_approved_at)
            .bind(&issue.rejection_notes)
            .bind(issue.rejected_by_user_id)
            .bind(issue.id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(saved)
    }

    // ------------------------------------------------------------------
    // Batches

    pub async fn find_batch(&self, id: i64) -> Result<Option<Batch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| batch_from_row(&r)).transpose()
    }

    pub async fn save_batch(&self, batch: &Batch) -> Result<Batch> {
        let mut conn = self.pool.acquire().await?;
        Self::save_batch_op(&mut conn, batch).await
    }

    pub async fn save_batch_op(conn: &mut SqliteConnection, batch: &Batch) -> Result<Batch> {
        let mut saved = batch.clone();
        if batch.id == 0 {
            let res = sqlx::query(
                "INSERT INTO batches (marc_org_code, name, version, created_at, status, location) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&batch.marc_org_code)
            .bind(&batch.name)
            .bind(batch.version)
            .bind(batch.created_at)
            .bind(batch.status.as_str())
            .bind(&batch.location)
            .execute(&mut *conn)
            .await?;
            saved.id = res.last_insert_rowid();
        } else {
            sqlx::query(
                "UPDATE batches SET marc_org_code = ?, name = ?, version = ?, created_at = ?, \
                 status = ?, location = ? WHERE id = ?",
            )
            .bind(&batch.marc_org_code)
            .bind(&batch.name)
            .bind(batch.version)
            .bind(batch.created_at)
            .bind(batch.status.as_str())
            .bind(&batch.location)
            .bind(batch.id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(saved)
    }

    /// Creates a batch and links the given issues to it, all in one
    /// transaction.
    pub async fn create_batch(&self, batch: &Batch, issues: &[Issue]) -> Result<Batch> {
        let mut tx = self.begin().await?;
        let saved = Self::save_batch_op(&mut tx, batch).await?;
        for issue in issues {
            let mut linked = issue.clone();
            linked.batch_id = saved.id;
            Self::save_issue_op(&mut tx, &linked).await?;
        }
        tx.commit().await?;
        Ok(saved)
    }

    // ------------------------------------------------------------------
    // Jobs

    pub async fn find_job(&self, id: i64) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    pub async fn find_job_op(conn: &mut SqliteConnection, id: i64) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    pub async fn find_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn find_jobs_by_status_and_type(
        &self,
        status: JobStatus,
        job_type: JobType,
    ) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? AND job_type = ? \
             ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(job_type.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn find_jobs_for_issue(&self, issue_id: i64) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE object_type = 'issue' AND object_id = ? \
             ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql).bind(issue_id).fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn save_job(&self, job: &Job) -> Result<Job> {
        let mut conn = self.pool.acquire().await?;
        Self::save_job_op(&mut conn, job).await
    }

    pub async fn save_job_op(conn: &mut SqliteConnection, job: &Job) -> Result<Job> {
        let mut saved = job.clone();
        let extra_data = job.encode_args()?;

        if job.id == 0 {
            let res = sqlx::query(
                "INSERT INTO jobs (created_at, started_at, completed_at, job_type, \
                 object_type, object_id, status, run_at, extra_data, location, queue_job_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(job.created_at)
            .bind(job.started_at)
            .bind(job.completed_at)
            .bind(job.job_type.as_str())
            .bind(job.object_type.as_str())
            .bind(job.object_id)
            .bind(job.status.as_str())
            .bind(job.run_at)
            .bind(&extra_data)
            .bind(&job.location)
            .bind(job.queue_job_id)
            .execute(&mut *conn)
            .await?;
            saved.id = res.last_insert_rowid();
        } else {
            sqlx::query(
                "UPDATE jobs SET created_at = ?, started_at = ?, completed_at = ?, \
                 job_type = ?, object_type = ?, object_id = ?, status = ?, run_at = ?, \
                 extra_data = ?, location = ?, queue_job_id = ? WHERE id = ?",
            )
            .bind(job.created_at)
            .bind(job.started_at)
            .bind(job.completed_at)
            .bind(job.job_type.as_str())
            .bind(job.object_type.as_str())
            .bind(job.object_id)
            .bind(job.status.as_str())
            .bind(job.run_at)
            .bind(&extra_data)
            .bind(&job.location)
            .bind(job.queue_job_id)
            .bind(job.id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(saved)
    }

    /// Atomically claims the oldest eligible pending job whose type is in
    /// the filter set: eligibility is `status = pending AND run_at <= now`,
    /// ordered by `created_at` then `id`. The claim flips the row to
    /// `in_process` and stamps `started_at` in a single guarded UPDATE, so
    /// two runners - in this process or another - can never take the same
    /// job.
    pub async fn pop_next_pending_job(
        &self,
        types: &[JobType],
        now: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        if types.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "UPDATE jobs SET status = ?, started_at = ? \
             WHERE status = ? AND id = ( \
                 SELECT id FROM jobs \
                 WHERE status = ? AND run_at <= ? AND job_type IN ({placeholders}) \
                 ORDER BY created_at ASC, id ASC LIMIT 1) \
             RETURNING {JOB_COLUMNS}"
        );

        let mut query = sqlx::query(&sql)
            .bind(JobStatus::InProcess.as_str())
            .bind(now)
            .bind(JobStatus::Pending.as_str())
            .bind(JobStatus::Pending.as_str())
            .bind(now);
        for t in types {
            query = query.bind(t.as_str());
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    // ------------------------------------------------------------------
    // Job logs

    pub async fn append_job_log(&self, job_id: i64, level: &str, message: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_logs (job_id, created_at, log_level, message) VALUES (?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(Utc::now())
        .bind(level)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn job_logs(&self, job_id: i64) -> Result<Vec<JobLog>> {
        let rows = sqlx::query(
            "SELECT id, job_id, created_at, log_level, message FROM job_logs \
             WHERE job_id = ? ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(JobLog {
                    id: row.try_get("id")?,
                    job_id: row.try_get("job_id")?,
                    created_at: row.try_get("created_at")?,
                    log_level: row.try_get("log_level")?,
                    message: row.try_get("message")?,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Audit logs (written by the UI; read-only here)

    pub async fn audit_logs(&self, limit: i64) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query(
            "SELECT id, created_at, actor, ip, action, message FROM audit_logs \
             ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AuditLog {
                    id: row.try_get("id")?,
                    created_at: row.try_get("created_at")?,
                    actor: row.try_get("actor")?,
                    ip: row.try_get("ip")?,
                    action: row.try_get("action")?,
                    message: row.try_get("message")?,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Titles

    /// Looks up a title's display name by LCCN, for METS rendering.
    pub async fn find_title_name(&self, lccn: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT name FROM titles WHERE lccn = ?")
            .bind(lccn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get("name")).transpose()?)
    }
}
