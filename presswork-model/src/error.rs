use thiserror::Error;

/// Errors produced by model constructors, parsers and validation routines.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid workflow step {0:?}")]
    InvalidWorkflowStep(String),

    #[error("invalid job type {0:?}")]
    InvalidJobType(String),

    #[error("invalid job status {0:?}")]
    InvalidJobStatus(String),

    #[error("invalid object type {0:?}")]
    InvalidObjectType(String),

    #[error("invalid batch status {0:?}")]
    InvalidBatchStatus(String),

    #[error("invalid batch name {name:?}: {reason}")]
    InvalidBatchName { name: String, reason: String },

    #[error("invalid job args: {0}")]
    Args(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
