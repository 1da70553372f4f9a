//! Application review: intake into an in-memory store, approver votes from reactions and replies,
//! and a write-once decision reached by quorum or by expiry.

pub mod decision;
pub mod domain;
pub mod features;
pub mod ingress;
pub mod notifier;
pub mod router;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod votes;

#[cfg(test)]
mod tests;

pub use decision::{DecisionEngine, DecisionOutcome};
pub use domain::{
    ApplicantRef, Application, ApplicationId, ApplicationStatus, ApplicationView, ApproverRef,
    FinalizationTrigger, IntakeSource, InvalidApplicationId, ReviewMessageRef, Tally, Verdict,
    Vote, VoteDecision,
};
pub use features::FeatureSwitches;
pub use ingress::{parse_reaction, parse_reply, IgnoreReason, IngressOutcome};
pub use notifier::{Notification, Notifier, NotifyError, Recipient, TracingNotifier};
pub use router::review_router;
pub use service::{Clock, ReviewError, ReviewService, SystemClock};
pub use store::ApplicationStore;
pub use sweeper::ExpirySweeper;
pub use votes::{ApproverRoster, VoteCollector, VoteError, VoteReceipt};
