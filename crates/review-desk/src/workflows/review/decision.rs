use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApproverRef, FinalizationTrigger, Tally, Verdict,
};

/// Final decision for one application and how it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub application_id: ApplicationId,
    pub verdict: Verdict,
    pub tally: Tally,
    pub trigger: FinalizationTrigger,
    /// Approver whose vote reached quorum. Unset for expiry.
    pub decided_by: Option<ApproverRef>,
}

impl DecisionOutcome {
    pub fn summary(&self) -> String {
        match (&self.trigger, &self.decided_by) {
            (FinalizationTrigger::Quorum, Some(approver)) => format!(
                "{} by quorum ({} approve / {} deny, deciding vote from {})",
                self.verdict.label(),
                self.tally.approve,
                self.tally.deny,
                approver
            ),
            (FinalizationTrigger::Quorum, None) => format!(
                "{} by quorum ({} approve / {} deny)",
                self.verdict.label(),
                self.tally.approve,
                self.tally.deny
            ),
            (FinalizationTrigger::Expiry, _) => format!(
                "{} on expiry ({} approve / {} deny)",
                self.verdict.label(),
                self.tally.approve,
                self.tally.deny
            ),
        }
    }
}

/// Stateless quorum rule. Both triggers reach their verdict through [`Tally::verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionEngine {
    quorum: usize,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(3)
    }
}

impl DecisionEngine {
    /// A quorum of zero is raised to one; an application cannot finalize without a vote.
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum: quorum.max(1),
        }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Quorum check run after each recorded vote. `None` while below quorum or once decided.
    pub fn evaluate(&self, application: &Application) -> Option<DecisionOutcome> {
        if !application.is_pending() || application.votes.len() < self.quorum {
            return None;
        }

        let counted = &application.votes[..self.quorum];
        let tally = Tally::from_votes(counted);
        Some(DecisionOutcome {
            application_id: application.id,
            verdict: tally.verdict(),
            tally,
            trigger: FinalizationTrigger::Quorum,
            decided_by: counted.last().map(|vote| vote.approver.clone()),
        })
    }

    /// Verdict from whatever votes exist when an application ages out.
    pub fn expire(&self, application: &Application) -> Option<DecisionOutcome> {
        if !application.is_pending() {
            return None;
        }

        let tally = application.tally();
        Some(DecisionOutcome {
            application_id: application.id,
            verdict: tally.verdict(),
            tally,
            trigger: FinalizationTrigger::Expiry,
            decided_by: None,
        })
    }
}

impl Application {
    /// Write-once transition out of `pending`. Returns `false` when the record was already
    /// decided, leaving it untouched.
    pub(crate) fn commit(&mut self, outcome: &DecisionOutcome, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = outcome.verdict.status();
        self.decided_by = outcome.decided_by.clone();
        self.decided_at = Some(now);
        self.finalized_by = Some(outcome.trigger);
        true
    }
}
