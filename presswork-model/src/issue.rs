use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowStep;

/// How long a claim on an issue lasts before the issue re-enters the
/// available pool.
pub const CLAIM_DURATION_DAYS: i64 = 7;

/// One newspaper issue and everything the workflow needs to know about it.
///
/// User ids of zero mean "nobody"; an empty `location` means the issue is not
/// physically present on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,

    // Metadata
    pub marc_org_code: String,
    pub lccn: String,
    /// Publication date in `YYYY-MM-DD` form. Kept as a string because
    /// uploads can arrive with garbage dates which curators fix during
    /// metadata entry; validation parses it.
    pub date: String,
    pub date_as_labeled: String,
    pub volume: String,
    /// The issue "number" is a label, not a number - real-world values
    /// include things like "ISSUE XIX".
    pub issue_number: String,
    pub edition: i64,
    pub edition_label: String,
    pub page_labels: Vec<String>,

    // Workflow state
    pub batch_id: i64,
    pub error: String,
    pub location: String,
    pub master_backup_location: String,
    pub human_name: String,
    pub is_from_scanner: bool,
    pub has_derivatives: bool,
    pub workflow_step: WorkflowStep,
    pub workflow_owner_id: i64,
    pub workflow_owner_expires_at: Option<DateTime<Utc>>,
    pub metadata_entry_user_id: i64,
    pub reviewed_by_user_id: i64,
    pub metadata_approved_at: Option<DateTime<Utc>>,
    pub rejection_notes: String,
    pub rejected_by_user_id: i64,
}

impl Issue {
    /// Creates an issue ready for saving, starting at the top of the
    /// workflow.
    pub fn new(moc: &str, lccn: &str, date: &str, edition: i64) -> Self {
        Issue {
            marc_org_code: moc.to_string(),
            lccn: lccn.to_string(),
            date: date.to_string(),
            edition,
            workflow_step: WorkflowStep::AwaitingProcessing,
            ..Issue::default()
        }
    }

    /// The compact `YYYYMMDDEE` date-plus-edition string used in directory
    /// names and issue keys. Falls back to the raw date with dashes stripped
    /// when the date won't parse.
    pub fn date_edition(&self) -> String {
        let compact = match NaiveDate::parse_from_str(&self.date, "%Y-%m-%d") {
            Ok(d) => d.format("%Y%m%d").to_string(),
            Err(_) => self.date.replace('-', ""),
        };
        format!("{}{:02}", compact, self.edition)
    }

    /// The stable human name used for the issue's on-disk directory:
    /// `<LCCN>-<YYYYMMDDEE>-<id>`. Derives and stores the name on first use
    /// so it never changes even if metadata is corrected later.
    pub fn human_name(&mut self) -> &str {
        if self.human_name.is_empty() {
            self.human_name = format!("{}-{}-{}", self.lccn, self.date_edition(), self.id);
        }
        &self.human_name
    }

    /// Assigns the issue to a user's desk for the standard claim window.
    pub fn claim(&mut self, user_id: i64, now: DateTime<Utc>) {
        self.workflow_owner_id = user_id;
        self.workflow_owner_expires_at = Some(now + Duration::days(CLAIM_DURATION_DAYS));
    }

    /// Releases the issue back to the pool.
    pub fn unclaim(&mut self) {
        self.workflow_owner_id = 0;
        self.workflow_owner_expires_at = None;
    }

    /// An issue is owned only while its claim hasn't lapsed. Expiry flips
    /// this without any write.
    pub fn is_owned(&self, now: DateTime<Utc>) -> bool {
        self.workflow_owner_id != 0
            && self.workflow_owner_expires_at.is_some_and(|at| now < at)
    }

    /// Available for claim: unowned (or expired) and not flagged with an
    /// unfixable error.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.is_owned(now) && self.error.is_empty()
    }

    /// Reviewer approval: clears the desk, stamps the approval, and moves
    /// the issue on toward METS generation.
    pub fn approve_metadata(&mut self, reviewer_id: i64, now: DateTime<Utc>) {
        self.unclaim();
        self.metadata_approved_at = Some(now);
        self.reviewed_by_user_id = reviewer_id;
        self.workflow_step = WorkflowStep::ReadyForMetsXml;
    }

    /// Reviewer rejection: the issue goes back to the desk of whoever
    /// entered the metadata, with the reviewer's notes attached.
    pub fn reject_metadata(&mut self, reviewer_id: i64, notes: &str, now: DateTime<Utc>) {
        self.claim(self.metadata_entry_user_id, now);
        self.workflow_step = WorkflowStep::ReadyForMetadataEntry;
        self.rejection_notes = notes.to_string();
        self.rejected_by_user_id = reviewer_id;
    }

    /// A curator reported an issue-level problem: record it and pull the
    /// issue out of everybody's queue.
    pub fn report_error(&mut self, message: &str) {
        self.error = message.to_string();
        self.unclaim();
        self.workflow_step = WorkflowStep::UnfixableMetadataError;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn claim_sets_a_week_long_lease() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
        issue.claim(3, now());
        assert!(issue.is_owned(now()));
        assert!(!issue.is_available(now()));

        // 7 days plus one second later the claim has lapsed without a write
        let later = now() + Duration::days(7) + Duration::seconds(1);
        assert!(!issue.is_owned(later));
        assert!(issue.is_available(later));
        assert_eq!(issue.workflow_owner_id, 3);
        assert!(issue.workflow_owner_expires_at.is_some());
    }

    #[test]
    fn unclaim_clears_ownership() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
        issue.claim(3, now());
        issue.unclaim();
        assert!(!issue.is_owned(now()));
        assert_eq!(issue.workflow_owner_id, 0);
        assert!(issue.workflow_owner_expires_at.is_none());
    }

    #[test]
    fn errored_issues_are_never_available() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
        issue.report_error("pages are from two different issues");
        assert!(!issue.is_available(now()));
        assert_eq!(issue.workflow_step, WorkflowStep::UnfixableMetadataError);
        assert_eq!(issue.workflow_owner_id, 0);
    }

    #[test]
    fn rejection_returns_issue_to_the_metadata_entry_desk() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
        issue.metadata_entry_user_id = 5;
        issue.workflow_step = WorkflowStep::AwaitingMetadataReview;
        issue.claim(9, now());

        issue.reject_metadata(9, "volume looks wrong", now());
        assert_eq!(issue.workflow_step, WorkflowStep::ReadyForMetadataEntry);
        assert_eq!(issue.workflow_owner_id, 5);
        assert_eq!(issue.rejected_by_user_id, 9);
        assert_eq!(issue.rejection_notes, "volume looks wrong");
    }

    #[test]
    fn approval_stamps_reviewer_and_advances() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
        issue.workflow_step = WorkflowStep::AwaitingMetadataReview;
        issue.claim(5, now());

        issue.approve_metadata(9, now());
        assert_eq!(issue.workflow_step, WorkflowStep::ReadyForMetsXml);
        assert_eq!(issue.reviewed_by_user_id, 9);
        assert_eq!(issue.metadata_approved_at, Some(now()));
        assert!(!issue.is_owned(now()));
    }

    #[test]
    fn human_name_is_stable_once_derived() {
        let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 2);
        issue.id = 42;
        assert_eq!(issue.human_name(), "sn12345678-2024011502-42");

        // Correcting the date later must not rename the directory
        issue.date = "2024-01-16".to_string();
        assert_eq!(issue.human_name(), "sn12345678-2024011502-42");
    }
}
