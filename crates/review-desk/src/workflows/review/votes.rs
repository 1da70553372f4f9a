use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::decision::{DecisionEngine, DecisionOutcome};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, ApproverRef, Vote, VoteDecision,
};
use super::notifier::{deliver, Notifier};
use super::store::ApplicationStore;

/// Identities allowed to vote. An empty roster admits everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApproverRoster {
    members: BTreeSet<ApproverRef>,
}

impl ApproverRoster {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: names
                .into_iter()
                .map(|name| ApproverRef(name.into()))
                .collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.members.is_empty()
    }

    pub fn permits(&self, approver: &ApproverRef) -> bool {
        self.is_open() || self.members.contains(approver)
    }
}

/// Result of a vote that was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum VoteReceipt {
    /// Vote appended; application still pending.
    Recorded {
        application_id: ApplicationId,
        votes: usize,
        quorum: usize,
    },
    /// Vote appended and it completed the quorum.
    Finalized(DecisionOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("application {application_id} is already {}", .status.label())]
    AlreadyDecided {
        application_id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("{approver} already voted on application {application_id}")]
    DuplicateVote {
        application_id: ApplicationId,
        approver: ApproverRef,
    },
    #[error("{approver} is not an approver")]
    NotAuthorized { approver: ApproverRef },
}

impl VoteError {
    /// Expected races and repeats that callers absorb rather than report.
    pub fn is_benign(&self) -> bool {
        !matches!(self, VoteError::NotFound(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            VoteError::NotFound(_) => "not_found",
            VoteError::AlreadyDecided { .. } => "already_decided",
            VoteError::DuplicateVote { .. } => "duplicate_vote",
            VoteError::NotAuthorized { .. } => "not_authorized",
        }
    }
}

enum Step {
    Recorded(VoteReceipt),
    Finalized(Box<Application>, DecisionOutcome),
}

/// Single entry point for every vote, whichever channel it came from.
pub struct VoteCollector<N> {
    store: Arc<ApplicationStore>,
    engine: DecisionEngine,
    roster: ApproverRoster,
    notifier: Arc<N>,
}

impl<N> VoteCollector<N>
where
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<ApplicationStore>,
        engine: DecisionEngine,
        roster: ApproverRoster,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            store,
            engine,
            roster,
            notifier,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn roster(&self) -> &ApproverRoster {
        &self.roster
    }

    /// Records one vote and, when it completes the quorum, finalizes the application.
    ///
    /// The duplicate check, append, quorum evaluation and status commit run under the store lock
    /// as one step. The notifier runs afterwards, outside the lock.
    pub fn cast_vote(
        &self,
        application_id: ApplicationId,
        approver: ApproverRef,
        decision: VoteDecision,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt, VoteError> {
        let step = self
            .store
            .update(application_id, |application| {
                self.record(application, approver, decision, now)
            })
            .ok_or(VoteError::NotFound(application_id))?;

        match step {
            Ok(Step::Recorded(receipt)) => Ok(receipt),
            Ok(Step::Finalized(application, outcome)) => {
                tracing::info!(
                    application = %application.id,
                    verdict = outcome.verdict.label(),
                    approvals = outcome.tally.approve,
                    denials = outcome.tally.deny,
                    decided_by = ?outcome.decided_by,
                    "application finalized by quorum"
                );
                deliver(self.notifier.as_ref(), &application, &outcome);
                Ok(VoteReceipt::Finalized(outcome))
            }
            Err(err) => {
                tracing::debug!(application = %application_id, reason = err.reason(), "vote ignored");
                Err(err)
            }
        }
    }

    fn record(
        &self,
        application: &mut Application,
        approver: ApproverRef,
        decision: VoteDecision,
        now: DateTime<Utc>,
    ) -> Result<Step, VoteError> {
        if !application.is_pending() {
            return Err(VoteError::AlreadyDecided {
                application_id: application.id,
                status: application.status,
            });
        }
        if !self.roster.permits(&approver) {
            return Err(VoteError::NotAuthorized { approver });
        }
        if application.has_vote_from(&approver) {
            return Err(VoteError::DuplicateVote {
                application_id: application.id,
                approver,
            });
        }

        tracing::debug!(
            application = %application.id,
            approver = %approver,
            decision = decision.label(),
            "vote recorded"
        );
        application.votes.push(Vote {
            approver,
            decision,
            cast_at: now,
        });

        match self.engine.evaluate(application) {
            Some(outcome) => {
                let committed = application.commit(&outcome, now);
                debug_assert!(committed, "pending status is checked under the same lock");
                if !committed {
                    application.votes.pop();
                    return Err(VoteError::AlreadyDecided {
                        application_id: application.id,
                        status: application.status,
                    });
                }
                Ok(Step::Finalized(Box::new(application.clone()), outcome))
            }
            None => Ok(Step::Recorded(VoteReceipt::Recorded {
                application_id: application.id,
                votes: application.votes.len(),
                quorum: self.engine.quorum(),
            })),
        }
    }
}
