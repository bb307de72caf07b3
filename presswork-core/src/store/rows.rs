//! Hand-written row mapping, the single place wire strings become enums.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use presswork_model::job::decode_args;
use presswork_model::{Batch, Issue, Job, ModelError};

use crate::error::{EngineError, Result};

fn parse<T>(value: std::result::Result<T, ModelError>) -> Result<T> {
    value.map_err(EngineError::from)
}

pub(super) fn issue_from_row(row: &SqliteRow) -> Result<Issue> {
    let step: String = row.try_get("workflow_step")?;
    let labels_csv: String = row.try_get("page_labels_csv")?;
    let page_labels = if labels_csv.is_empty() {
        Vec::new()
    } else {
        labels_csv.split(',').map(str::to_string).collect()
    };

    Ok(Issue {
        id: row.try_get("id")?,
        marc_org_code: row.try_get("marc_org_code")?,
        lccn: row.try_get("lccn")?,
        date: row.try_get("date")?,
        date_as_labeled: row.try_get("date_as_labeled")?,
        volume: row.try_get("volume")?,
        issue_number: row.try_get("issue_number")?,
        edition: row.try_get("edition")?,
        edition_label: row.try_get("edition_label")?,
        page_labels,
        batch_id: row.try_get("batch_id")?,
        error: row.try_get("error")?,
        location: row.try_get("location")?,
        master_backup_location: row.try_get("master_backup_location")?,
        human_name: row.try_get("human_name")?,
        is_from_scanner: row.try_get("is_from_scanner")?,
        has_derivatives: row.try_get("has_derivatives")?,
        workflow_step: parse(step.parse())?,
        workflow_owner_id: row.try_get("workflow_owner_id")?,
        workflow_owner_expires_at: row.try_get("workflow_owner_expires_at")?,
        metadata_entry_user_id: row.try_get("metadata_entry_user_id")?,
        reviewed_by_user_id: row.try_get("reviewed_by_user_id")?,
        metadata_approved_at: row.try_get("metadata_approved_at")?,
        rejection_notes: row.try_get("rejection_notes")?,
        rejected_by_user_id: row.try_get("rejected_by_user_id")?,
    })
}

pub(super) fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    let status: String = row.try_get("status")?;
    Ok(Batch {
        id: row.try_get("id")?,
        marc_org_code: row.try_get("marc_org_code")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        status: parse(status.parse())?,
        location: row.try_get("location")?,
    })
}

pub(super) fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let job_type: String = row.try_get("job_type")?;
    let object_type: String = row.try_get("object_type")?;
    let status: String = row.try_get("status")?;
    let extra_data: String = row.try_get("extra_data")?;

    Ok(Job {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        job_type: parse(job_type.parse())?,
        object_type: parse(object_type.parse())?,
        object_id: row.try_get("object_id")?,
        status: parse(status.parse())?,
        run_at: row.try_get("run_at")?,
        args: parse(decode_args(&extra_data))?,
        location: row.try_get("location")?,
        queue_job_id: row.try_get("queue_job_id")?,
    })
}
