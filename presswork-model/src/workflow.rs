use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The discrete stages an issue moves through on its way to production.
///
/// The wire strings are part of the persistent schema and must never change.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    #[default]
    AwaitingProcessing,
    AwaitingPageReview,
    ReadyForMetadataEntry,
    AwaitingMetadataReview,
    ReadyForMetsXml,
    ReadyForBatching,
    InProduction,
    UnfixableMetadataError,
}

/// Every step an issue is allowed to carry in storage.
pub const ALL_WORKFLOW_STEPS: [WorkflowStep; 8] = [
    WorkflowStep::AwaitingProcessing,
    WorkflowStep::AwaitingPageReview,
    WorkflowStep::ReadyForMetadataEntry,
    WorkflowStep::AwaitingMetadataReview,
    WorkflowStep::ReadyForMetsXml,
    WorkflowStep::ReadyForBatching,
    WorkflowStep::InProduction,
    WorkflowStep::UnfixableMetadataError,
];

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::AwaitingProcessing => "awaiting_processing",
            WorkflowStep::AwaitingPageReview => "awaiting_page_review",
            WorkflowStep::ReadyForMetadataEntry => "ready_for_metadata_entry",
            WorkflowStep::AwaitingMetadataReview => "awaiting_metadata_review",
            WorkflowStep::ReadyForMetsXml => "ready_for_mets_xml",
            WorkflowStep::ReadyForBatching => "ready_for_batching",
            WorkflowStep::InProduction => "in_production",
            WorkflowStep::UnfixableMetadataError => "unfixable_metadata_error",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStep {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_processing" => Ok(WorkflowStep::AwaitingProcessing),
            "awaiting_page_review" => Ok(WorkflowStep::AwaitingPageReview),
            "ready_for_metadata_entry" => Ok(WorkflowStep::ReadyForMetadataEntry),
            "awaiting_metadata_review" => Ok(WorkflowStep::AwaitingMetadataReview),
            "ready_for_mets_xml" => Ok(WorkflowStep::ReadyForMetsXml),
            "ready_for_batching" => Ok(WorkflowStep::ReadyForBatching),
            "in_production" => Ok(WorkflowStep::InProduction),
            "unfixable_metadata_error" => Ok(WorkflowStep::UnfixableMetadataError),
            other => Err(ModelError::InvalidWorkflowStep(other.to_string())),
        }
    }
}
