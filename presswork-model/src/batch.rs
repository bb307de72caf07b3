use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Where a batch sits in its shipping lifecycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Pending,
    QcReady,
    FailedQc,
    Live,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::QcReady => "qc_ready",
            BatchStatus::FailedQc => "failed_qc",
            BatchStatus::Live => "live",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "qc_ready" => Ok(BatchStatus::QcReady),
            "failed_qc" => Ok(BatchStatus::FailedQc),
            "live" => Ok(BatchStatus::Live),
            other => Err(ModelError::InvalidBatchStatus(other.to_string())),
        }
    }
}

/// A shipping unit grouping ready issues. The keyword half of the full name
/// combines the creation date with a short random word, e.g.
/// `20240115horsetail`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub marc_org_code: String,
    /// The short keyword, without the date prefix.
    pub name: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub location: String,
}

impl Batch {
    pub fn new(moc: &str, name: &str, created_at: DateTime<Utc>) -> Self {
        Batch {
            id: 0,
            marc_org_code: moc.to_string(),
            name: name.to_string(),
            version: 1,
            created_at,
            status: BatchStatus::Pending,
            location: String::new(),
        }
    }

    /// The full batch name as downstream ingest systems need it:
    /// `batch_<MOC>_<YYYYMMDDkeyword>_ver<NN>`.
    pub fn full_name(&self) -> BatchName {
        BatchName {
            marc_org_code: self.marc_org_code.clone(),
            keyword: format!("{}{}", self.created_at.format("%Y%m%d"), self.name),
            version: self.version,
        }
    }
}

/// The parsed pieces of a full batch name. `Display` and [`BatchName::parse`]
/// are exact inverses.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BatchName {
    pub marc_org_code: String,
    /// The date-prefixed keyword, e.g. `20240115horsetail`.
    pub keyword: String,
    pub version: i64,
}

impl BatchName {
    /// Parses a full batch name. Keywords are not supposed to contain
    /// underscores, but live batches exist that break that rule, so
    /// everything between the org code and the version is the keyword.
    pub fn parse(fullname: &str) -> Result<Self, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidBatchName {
            name: fullname.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = fullname.split('_').collect();
        if parts.len() < 4 {
            return Err(invalid("too few segments"));
        }
        if parts[0] != "batch" {
            return Err(invalid(r#"must begin with "batch_""#));
        }

        let ver = parts[parts.len() - 1];
        if ver.len() != 5 || !ver.starts_with("ver") {
            return Err(invalid("invalid version segment"));
        }
        let version: i64 = ver[3..].parse().map_err(|_| invalid("invalid version number"))?;
        if version < 1 {
            return Err(invalid("version must be 1 or greater"));
        }

        Ok(BatchName {
            marc_org_code: parts[1].to_string(),
            keyword: parts[2..parts.len() - 1].join("_"),
            version,
        })
    }
}

impl fmt::Display for BatchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch_{}_{}_ver{:02}",
            self.marc_org_code, self.keyword, self.version
        )
    }
}
