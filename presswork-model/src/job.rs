use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Names for the recognized job argument keys. Using constants keeps a
/// writer and its reader from disagreeing on spelling.
pub mod args {
    pub const WORKFLOW_STEP: &str = "WorkflowStep";
    pub const BATCH_STATUS: &str = "BatchStatus";
    pub const LOCATION: &str = "Location";
    pub const SOURCE: &str = "Source";
    pub const DESTINATION: &str = "Destination";

    /// Key under which unrecognized legacy payloads are preserved.
    pub const LEGACY: &str = "legacy";
}

/// Version byte prefixed to every encoded args payload.
pub const ARGS_VERSION: u8 = b'2';

/// Every kind of work the engine queues and processes.
///
/// Wire strings are part of the persistent schema and must never change.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    SetIssueWorkflowStep,
    SetIssueMasterBackupLocation,
    SetIssueLocation,
    SetBatchStatus,
    SetBatchLocation,
    PageSplit,
    MoveIssueToWorkflow,
    MoveIssueToPageReview,
    MakeDerivatives,
    BuildMets,
    ArchiveMasterFiles,
    CreateBatchStructure,
    MakeBatchXml,
    WriteBagitManifest,
    SyncDirectory,
    DeleteDirectory,
    RenameDirectory,
}

/// Every job type that can exist in the jobs table, for validating
/// command-line queue names.
pub const ALL_JOB_TYPES: [JobType; 17] = [
    JobType::SetIssueWorkflowStep,
    JobType::SetIssueMasterBackupLocation,
    JobType::SetIssueLocation,
    JobType::SetBatchStatus,
    JobType::SetBatchLocation,
    JobType::PageSplit,
    JobType::MoveIssueToWorkflow,
    JobType::MoveIssueToPageReview,
    JobType::MakeDerivatives,
    JobType::BuildMets,
    JobType::ArchiveMasterFiles,
    JobType::CreateBatchStructure,
    JobType::MakeBatchXml,
    JobType::WriteBagitManifest,
    JobType::SyncDirectory,
    JobType::DeleteDirectory,
    JobType::RenameDirectory,
];

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SetIssueWorkflowStep => "set_issue_workflow_step",
            JobType::SetIssueMasterBackupLocation => "set_issue_master_backup_location",
            JobType::SetIssueLocation => "set_issue_location",
            JobType::SetBatchStatus => "set_batch_status",
            JobType::SetBatchLocation => "set_batch_location",
            JobType::PageSplit => "page_split",
            JobType::MoveIssueToWorkflow => "move_issue_to_workflow",
            JobType::MoveIssueToPageReview => "move_issue_to_page_review",
            JobType::MakeDerivatives => "make_derivatives",
            JobType::BuildMets => "build_mets",
            JobType::ArchiveMasterFiles => "archive_master_files",
            JobType::CreateBatchStructure => "create_batch_structure",
            JobType::MakeBatchXml => "make_batch_xml",
            JobType::WriteBagitManifest => "write_bagit_manifest",
            JobType::SyncDirectory => "sync_directory",
            JobType::DeleteDirectory => "delete_directory",
            JobType::RenameDirectory => "rename_directory",
        }
    }

    /// The near-real-time field setters, grouped for the fast runner pool.
    pub fn is_set_field(&self) -> bool {
        matches!(
            self,
            JobType::SetIssueWorkflowStep
                | JobType::SetIssueMasterBackupLocation
                | JobType::SetIssueLocation
                | JobType::SetBatchStatus
                | JobType::SetBatchLocation
        )
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_JOB_TYPES
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| ModelError::InvalidJobType(s.to_string()))
    }
}

/// The states a job can exist in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for another job to complete.
    OnHold,
    /// Needs to be processed.
    Pending,
    /// Taken by a runner but not done.
    InProcess,
    /// Completed successfully.
    Success,
    /// Complete, but did not succeed; eligible for requeue.
    Failed,
    /// Ignored - e.g. a failed job which was cloned and rerun.
    FailedDone,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::OnHold => "on_hold",
            JobStatus::Pending => "pending",
            JobStatus::InProcess => "in_process",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::FailedDone => "failed_done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::FailedDone
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_hold" => Ok(JobStatus::OnHold),
            "pending" => Ok(JobStatus::Pending),
            "in_process" => Ok(JobStatus::InProcess),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "failed_done" => Ok(JobStatus::FailedDone),
            other => Err(ModelError::InvalidJobStatus(other.to_string())),
        }
    }
}

/// What kind of entity a job targets, if any.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    #[default]
    None,
    Issue,
    Batch,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::None => "",
            ObjectType::Issue => "issue",
            ObjectType::Batch => "batch",
        }
    }
}

impl FromStr for ObjectType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(ObjectType::None),
            "issue" => Ok(ObjectType::Issue),
            "batch" => Ok(ObjectType::Batch),
            other => Err(ModelError::InvalidObjectType(other.to_string())),
        }
    }
}

/// A durable unit of work. Jobs are chained through `queue_job_id`: a
/// successful job releases exactly the job that id points at.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub job_type: JobType,
    pub object_type: ObjectType,
    pub object_id: i64,
    pub status: JobStatus,
    /// The job won't run until sometime after this instant; usually very
    /// close, but runners only poll on an interval.
    pub run_at: DateTime<Utc>,
    pub args: BTreeMap<String, String>,
    /// Snapshot of the target issue's location when the job was released.
    pub location: String,
    /// The job to release when this one succeeds; zero means none.
    pub queue_job_id: i64,
}

impl Job {
    /// Sets up a job of the given type as pending and ready to run right
    /// away.
    pub fn new(job_type: JobType, args: BTreeMap<String, String>, now: DateTime<Utc>) -> Self {
        Job {
            id: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            job_type,
            object_type: ObjectType::None,
            object_id: 0,
            status: JobStatus::Pending,
            run_at: now,
            args,
            location: String::new(),
            queue_job_id: 0,
        }
    }

    /// Convenience accessor for a single argument.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// Encodes the args map for the `extra_data` column: empty map becomes
    /// the empty string, anything else is the version byte followed by JSON.
    pub fn encode_args(&self) -> Result<String, ModelError> {
        encode_args(&self.args)
    }
}

/// One log entry attached to a job. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobLog {
    pub id: i64,
    pub job_id: i64,
    pub created_at: DateTime<Utc>,
    pub log_level: String,
    pub message: String,
}

/// See [`Job::encode_args`].
pub fn encode_args(map: &BTreeMap<String, String>) -> Result<String, ModelError> {
    if map.is_empty() {
        return Ok(String::new());
    }
    let json = serde_json::to_string(map)?;
    let mut out = String::with_capacity(json.len() + 1);
    out.push(ARGS_VERSION as char);
    out.push_str(&json);
    Ok(out)
}

/// Decodes an `extra_data` payload. Data without the recognized version
/// prefix is preserved verbatim under the `legacy` key so nothing is lost
/// across schema evolution.
pub fn decode_args(raw: &str) -> Result<BTreeMap<String, String>, ModelError> {
    if raw.is_empty() {
        return Ok(BTreeMap::new());
    }
    if raw.as_bytes()[0] != ARGS_VERSION {
        let mut map = BTreeMap::new();
        map.insert(args::LEGACY.to_string(), raw.to_string());
        return Ok(map);
    }
    Ok(serde_json::from_str(&raw[1..])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn job_type_strings_round_trip() {
        for t in ALL_JOB_TYPES {
            assert_eq!(t.as_str().parse::<JobType>().unwrap(), t);
        }
        assert!("shrink_pdfs".parse::<JobType>().is_err());
    }

    #[test]
    fn args_round_trip() {
        let original = args_of(&[
            (args::WORKFLOW_STEP, "awaiting_processing"),
            (args::LOCATION, "/mnt/backup/sn12345678-2024011501-42"),
        ]);
        let encoded = encode_args(&original).unwrap();
        assert_eq!(encoded.as_bytes()[0], ARGS_VERSION);
        assert_eq!(decode_args(&encoded).unwrap(), original);
    }

    #[test]
    fn empty_args_encode_to_empty_string() {
        let encoded = encode_args(&BTreeMap::new()).unwrap();
        assert!(encoded.is_empty());
        assert!(decode_args("").unwrap().is_empty());
    }

    #[test]
    fn unversioned_data_is_preserved_as_legacy() {
        let decoded = decode_args("AwaitingProcessing").unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.get(args::LEGACY).map(String::as_str), Some("AwaitingProcessing"));
    }

    #[test]
    fn corrupt_versioned_data_is_an_error() {
        assert!(decode_args("2{not json").is_err());
    }
}
