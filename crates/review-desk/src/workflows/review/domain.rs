use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-local, monotonically assigned application identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app-{:06}", self.0)
    }
}

impl FromStr for ApplicationId {
    type Err = InvalidApplicationId;

    /// Accepts both the display form (`app-000042`) and a bare number.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("app-").unwrap_or(trimmed);
        digits
            .parse::<u64>()
            .map(ApplicationId)
            .map_err(|_| InvalidApplicationId(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid application id")]
pub struct InvalidApplicationId(pub String);

/// Opaque reference to the person who submitted an application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantRef(pub String);

impl ApplicantRef {
    /// Blank references from intake sources count as unresolved.
    pub fn resolved(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }
}

impl fmt::Display for ApplicantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of someone casting a vote.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApproverRef(pub String);

impl fmt::Display for ApproverRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gateway message that announced an application to the review channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewMessageRef(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDecision {
    Approve,
    Deny,
}

impl VoteDecision {
    pub const fn label(self) -> &'static str {
        match self {
            VoteDecision::Approve => "approve",
            VoteDecision::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub approver: ApproverRef,
    pub decision: VoteDecision,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Denied,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Denied => "denied",
        }
    }

    pub const fn is_pending(self) -> bool {
        matches!(self, ApplicationStatus::Pending)
    }
}

/// A final status. Converting to [`ApplicationStatus`] never yields `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Denied,
}

impl Verdict {
    pub const fn label(self) -> &'static str {
        self.status().label()
    }

    pub const fn status(self) -> ApplicationStatus {
        match self {
            Verdict::Approved => ApplicationStatus::Approved,
            Verdict::Denied => ApplicationStatus::Denied,
        }
    }
}

/// What caused an application to leave `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationTrigger {
    Quorum,
    Expiry,
}

impl FinalizationTrigger {
    pub const fn label(self) -> &'static str {
        match self {
            FinalizationTrigger::Quorum => "quorum",
            FinalizationTrigger::Expiry => "expiry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeSource {
    Command,
    Spreadsheet,
}

/// Approve/deny counts derived from the recorded votes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub approve: usize,
    pub deny: usize,
}

impl Tally {
    pub fn from_votes(votes: &[Vote]) -> Self {
        votes.iter().fold(Self::default(), |mut tally, vote| {
            match vote.decision {
                VoteDecision::Approve => tally.approve += 1,
                VoteDecision::Deny => tally.deny += 1,
            }
            tally
        })
    }

    pub const fn total(&self) -> usize {
        self.approve + self.deny
    }

    /// Strict majority approves; ties and empty tallies deny.
    pub const fn verdict(&self) -> Verdict {
        if self.approve > self.deny {
            Verdict::Approved
        } else {
            Verdict::Denied
        }
    }
}

/// A single submission and its voting state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub kind: String,
    pub applicant: Option<ApplicantRef>,
    pub content: String,
    pub source: IntakeSource,
    pub created_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    pub votes: Vec<Vote>,
    pub decided_by: Option<ApproverRef>,
    pub decided_at: Option<DateTime<Utc>>,
    pub finalized_by: Option<FinalizationTrigger>,
    pub review_message: Option<ReviewMessageRef>,
}

impl Application {
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn tally(&self) -> Tally {
        Tally::from_votes(&self.votes)
    }

    pub fn has_vote_from(&self, approver: &ApproverRef) -> bool {
        self.votes.iter().any(|vote| &vote.approver == approver)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }

    pub fn view(&self) -> ApplicationView {
        let tally = self.tally();
        ApplicationView {
            application_id: self.id.to_string(),
            kind: self.kind.clone(),
            applicant: self.applicant.clone(),
            status: self.status.label(),
            approvals: tally.approve,
            denials: tally.deny,
            created_at: self.created_at,
            decided_at: self.decided_at,
            decided_by: self.decided_by.clone(),
            finalized_by: self.finalized_by.map(FinalizationTrigger::label),
        }
    }
}

/// Public projection for HTTP and CLI output; omits free-text content and voter list.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub application_id: String,
    pub kind: String,
    pub applicant: Option<ApplicantRef>,
    pub status: &'static str,
    pub approvals: usize,
    pub denials: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<ApproverRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_by: Option<&'static str>,
}
