use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use review_desk::config::ReviewConfig;
use review_desk::workflows::review::{
    Application, ApplicantRef, ApplicationStatus, ApproverRef, Clock, DecisionOutcome,
    FinalizationTrigger, IngressOutcome, Notification, Notifier, NotifyError, Recipient,
    ReviewMessageRef, ReviewService, VoteReceipt,
};

struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    fn advance(&self, by: Duration) {
        *self.0.lock().expect("clock lock") += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock lock")
    }
}

#[derive(Default)]
struct Outbox(Mutex<Vec<Notification>>);

impl Notifier for Outbox {
    fn notify(
        &self,
        application: &Application,
        outcome: &DecisionOutcome,
    ) -> Result<(), NotifyError> {
        self.0
            .lock()
            .expect("outbox lock")
            .push(Notification::from_decision(application, outcome));
        Ok(())
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 18, 30, 0)
        .single()
        .expect("valid timestamp")
}

fn service() -> (ReviewService<Outbox>, Arc<Outbox>, Arc<FixedClock>) {
    let config = ReviewConfig {
        quorum: 3,
        approvers: ["alice", "bob", "carol", "dave"]
            .into_iter()
            .map(String::from)
            .collect(),
        ..ReviewConfig::default()
    };
    let outbox = Arc::new(Outbox::default());
    let clock = Arc::new(FixedClock(Mutex::new(start())));
    let service = ReviewService::with_clock(&config, outbox.clone(), clock.clone());
    (service, outbox, clock)
}

#[test]
fn application_lifecycle_from_intake_to_notification() {
    let (service, outbox, clock) = service();
    let application = service
        .submit(
            "tester",
            ApplicantRef::resolved("member-1001"),
            "Why do you want to test? I file good bug reports.",
        )
        .expect("submission accepted");
    service
        .link_review_message(application.id, ReviewMessageRef("review-55".into()))
        .expect("linked");

    clock.advance(Duration::hours(1));
    let votes = [
        ("alice", "✅"),
        ("alice", "❌"),
        ("bob", "👍🏻"),
        ("carol", "👎"),
    ];
    let outcomes: Vec<IngressOutcome> = votes
        .iter()
        .map(|(approver, emoji)| {
            service
                .vote_via_reaction(
                    &ReviewMessageRef("review-55".into()),
                    ApproverRef((*approver).to_string()),
                    emoji,
                )
                .expect("reaction handled")
        })
        .collect();

    assert!(matches!(
        outcomes.last(),
        Some(IngressOutcome::Counted(VoteReceipt::Finalized(_)))
    ));
    let stored = service.get(application.id).expect("stored");
    assert_eq!(stored.status, ApplicationStatus::Approved);
    assert_eq!(stored.decided_by, Some(ApproverRef("carol".into())));
    assert_eq!(stored.votes.len(), 3);

    let sent = outbox.0.lock().expect("outbox lock").clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, "application_approved");
    assert_eq!(
        sent[0].recipients,
        vec![
            Recipient::Applicant(ApplicantRef("member-1001".into())),
            Recipient::ReviewChannel,
        ]
    );
    assert_eq!(
        sent[0].details.get("decided_by").map(String::as_str),
        Some("carol")
    );

    clock.advance(Duration::days(30));
    assert!(service.sweep_expired().is_empty());
    assert_eq!(outbox.0.lock().expect("outbox lock").len(), 1);
}

#[test]
fn stale_applications_expire_while_fresh_ones_wait() {
    let (service, outbox, clock) = service();
    let stale = service
        .submit("staff", None, "")
        .expect("submission accepted");
    clock.advance(Duration::days(3));
    let fresh = service
        .submit("staff", ApplicantRef::resolved("member-7"), "")
        .expect("submission accepted");
    service
        .cast_vote(
            stale.id,
            ApproverRef("dave".into()),
            review_desk::workflows::review::VoteDecision::Approve,
        )
        .expect("vote");

    clock.advance(Duration::days(4));
    let expired = service.sweep_expired();

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].application_id, stale.id);
    assert_eq!(expired[0].trigger, FinalizationTrigger::Expiry);
    let stale = service.get(stale.id).expect("stored");
    assert_eq!(stale.status, ApplicationStatus::Approved);
    assert_eq!(stale.decided_by, None);
    assert!(service.get(fresh.id).expect("stored").is_pending());

    let sent = outbox.0.lock().expect("outbox lock").clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![Recipient::ReviewChannel]);
    assert_eq!(
        sent[0].details.get("trigger").map(String::as_str),
        Some("expiry")
    );
}
