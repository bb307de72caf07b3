use chrono::NaiveDate;

use crate::issue::Issue;

/// How serious a metadata problem is. Approval requires zero major errors;
/// minor errors are surfaced but don't block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Major,
    Minor,
}

/// One classified problem with an issue's metadata.
#[derive(Clone, Debug)]
pub struct MetadataError {
    pub severity: Severity,
    pub field: &'static str,
    pub message: String,
}

impl MetadataError {
    fn major(field: &'static str, message: impl Into<String>) -> Self {
        MetadataError {
            severity: Severity::Major,
            field,
            message: message.into(),
        }
    }

    fn minor(field: &'static str, message: impl Into<String>) -> Self {
        MetadataError {
            severity: Severity::Minor,
            field,
            message: message.into(),
        }
    }
}

/// Checks an issue's metadata ahead of review or approval. Idempotent and
/// pure: the same issue always yields the same list.
pub fn validate_metadata(issue: &Issue) -> Vec<MetadataError> {
    let mut errors = Vec::new();

    if issue.date.trim().is_empty() {
        errors.push(MetadataError::major("date", "date is required"));
    } else if NaiveDate::parse_from_str(&issue.date, "%Y-%m-%d").is_err() {
        errors.push(MetadataError::major(
            "date",
            format!("{:?} is not a valid YYYY-MM-DD date", issue.date),
        ));
    }

    if issue.edition < 1 {
        errors.push(MetadataError::major("edition", "edition ordinal is required"));
    }

    if issue.page_labels.is_empty() {
        errors.push(MetadataError::major(
            "page_labels",
            "at least one page label is required",
        ));
    } else if issue.page_labels.iter().any(|l| l.trim().is_empty()) {
        errors.push(MetadataError::major("page_labels", "page labels must not be blank"));
    }

    if issue.issue_number.trim().is_empty() && issue.date_as_labeled.trim().is_empty() {
        errors.push(MetadataError::major(
            "issue_number",
            "issue number or date-as-labeled is required",
        ));
    }

    if issue.volume.trim().is_empty() {
        errors.push(MetadataError::minor("volume", "volume is blank"));
    }
    if issue.date_as_labeled.trim().is_empty() {
        errors.push(MetadataError::minor("date_as_labeled", "date as labeled is blank"));
    }

    errors
}

/// True when nothing blocks reviewer approval.
pub fn can_approve(errors: &[MetadataError]) -> bool {
    errors.iter().all(|e| e.severity != Severity::Major)
}
