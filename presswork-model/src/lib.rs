//! Domain types for the presswork curation engine.
//!
//! This crate holds the pure data model: workflow steps, issues, batches,
//! durable job records and their argument codec, plus metadata validation.
//! Nothing here touches the database or the filesystem; persistence lives in
//! `presswork-core`.

pub mod audit;
pub mod batch;
pub mod error;
pub mod issue;
pub mod job;
pub mod validation;
pub mod workflow;

pub use audit::AuditLog;
pub use batch::{Batch, BatchName, BatchStatus};
pub use error::{ModelError, Result};
pub use issue::Issue;
pub use job::{Job, JobLog, JobStatus, JobType, ObjectType};
pub use validation::{validate_metadata, MetadataError, Severity};
pub use workflow::WorkflowStep;
