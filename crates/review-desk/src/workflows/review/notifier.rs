use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::decision::DecisionOutcome;
use super::domain::{ApplicantRef, Application, ApplicationId, Verdict};
use super::features::FeatureSwitches;

/// Outbound hook that tells the applicant and the review channel about a decision.
///
/// Called once per finalization, after the store lock has been released. Implementations may be
/// slow or fail; neither affects the recorded decision.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        application: &Application,
        outcome: &DecisionOutcome,
    ) -> Result<(), NotifyError>;
}

/// Hands a committed decision to the notifier. Failures are logged and swallowed.
pub(crate) fn deliver<N>(notifier: &N, application: &Application, outcome: &DecisionOutcome)
where
    N: Notifier + ?Sized,
{
    if let Err(err) = notifier.notify(application, outcome) {
        tracing::warn!(
            application = %application.id,
            verdict = outcome.verdict.label(),
            error = %err,
            "decision notification failed; decision stands"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("recipient {0} could not be reached")]
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "target")]
pub enum Recipient {
    Applicant(ApplicantRef),
    ReviewChannel,
}

/// Rendered decision message, shared by every transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub application_id: ApplicationId,
    pub recipients: Vec<Recipient>,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    /// Unresolved applicants only get the review-channel copy.
    pub fn from_decision(application: &Application, outcome: &DecisionOutcome) -> Self {
        let template = match outcome.verdict {
            Verdict::Approved => "application_approved",
            Verdict::Denied => "application_denied",
        };

        let mut recipients = Vec::with_capacity(2);
        if let Some(applicant) = &application.applicant {
            recipients.push(Recipient::Applicant(applicant.clone()));
        }
        recipients.push(Recipient::ReviewChannel);

        let mut details = BTreeMap::new();
        details.insert("kind".to_string(), application.kind.clone());
        details.insert("decision".to_string(), outcome.verdict.label().to_string());
        details.insert("trigger".to_string(), outcome.trigger.label().to_string());
        details.insert("approvals".to_string(), outcome.tally.approve.to_string());
        details.insert("denials".to_string(), outcome.tally.deny.to_string());
        if let Some(approver) = &outcome.decided_by {
            details.insert("decided_by".to_string(), approver.to_string());
        }

        Self {
            template: template.to_string(),
            application_id: application.id,
            recipients,
            details,
        }
    }
}

/// Default transport when no gateway is attached: decisions land in the service log.
#[derive(Debug, Clone)]
pub struct TracingNotifier {
    enabled: Arc<AtomicBool>,
}

impl Default for TracingNotifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TracingNotifier {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// Notifier that tracks the runtime `logging` switch.
    pub fn following(switches: &FeatureSwitches) -> Self {
        Self {
            enabled: switches.logging_switch(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Notifier for TracingNotifier {
    fn notify(
        &self,
        application: &Application,
        outcome: &DecisionOutcome,
    ) -> Result<(), NotifyError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let notification = Notification::from_decision(application, outcome);
        for recipient in &notification.recipients {
            match recipient {
                Recipient::Applicant(applicant) => tracing::info!(
                    application = %notification.application_id,
                    applicant = %applicant,
                    template = %notification.template,
                    "decision delivered to applicant"
                ),
                Recipient::ReviewChannel => tracing::info!(
                    application = %notification.application_id,
                    template = %notification.template,
                    summary = %outcome.summary(),
                    "decision posted to review channel"
                ),
            }
        }
        Ok(())
    }
}
