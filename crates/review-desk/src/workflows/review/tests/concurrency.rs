use super::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

use crate::workflows::review::{ApproverRef, VoteDecision, VoteError, VoteReceipt};

#[test]
fn concurrent_votes_finalize_once_without_duplicate_approvers() {
    let (service, notifier, _) = build_service(&review_config(3));
    let service = Arc::new(service);
    let application_id = service
        .submit("tester", None, "")
        .expect("submission accepted")
        .id;

    let voters = 6;
    let attempts_per_voter = 4;
    let barrier = Arc::new(Barrier::new(voters));
    let handles: Vec<_> = (0..voters)
        .map(|index| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut finalized = 0;
                for _ in 0..attempts_per_voter {
                    let decision = if index % 2 == 0 {
                        VoteDecision::Approve
                    } else {
                        VoteDecision::Deny
                    };
                    match service.cast_vote(
                        application_id,
                        ApproverRef(format!("mod-{index}")),
                        decision,
                    ) {
                        Ok(VoteReceipt::Finalized(_)) => finalized += 1,
                        Ok(VoteReceipt::Recorded { .. }) => {}
                        Err(err) => assert!(err.is_benign(), "unexpected error {err:?}"),
                    }
                }
                finalized
            })
        })
        .collect();

    let finalized: usize = handles
        .into_iter()
        .map(|handle| handle.join().expect("voter thread"))
        .sum();

    let stored = service.get(application_id).expect("stored");
    assert_eq!(finalized, 1);
    assert_eq!(stored.votes.len(), 3);
    let mut approvers: Vec<_> = stored.votes.iter().map(|vote| &vote.approver).collect();
    approvers.sort();
    approvers.dedup();
    assert_eq!(approvers.len(), 3);
    assert!(!stored.is_pending());
    assert_eq!(stored.decided_by.as_ref(), Some(&stored.votes[2].approver));
    assert_eq!(notifier.count_for(application_id), 1);
}

#[test]
fn sweep_racing_votes_commits_exactly_one_decision() {
    for _ in 0..20 {
        let (service, notifier, clock) = build_service(&review_config(3));
        let service = Arc::new(service);
        let application_id = service
            .submit("tester", None, "")
            .expect("submission accepted")
            .id;
        service
            .cast_vote(application_id, ApproverRef("mod-a".into()), VoteDecision::Approve)
            .expect("vote");
        service
            .cast_vote(application_id, ApproverRef("mod-b".into()), VoteDecision::Approve)
            .expect("vote");
        clock.advance(chrono::Duration::days(7));

        let barrier = Arc::new(Barrier::new(2));
        let voter = {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.cast_vote(
                    application_id,
                    ApproverRef("mod-c".into()),
                    VoteDecision::Deny,
                )
            })
        };
        let sweeper = {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.sweep_expired()
            })
        };

        let vote = voter.join().expect("voter thread");
        let swept = sweeper.join().expect("sweeper thread");

        let quorum_won = matches!(vote, Ok(VoteReceipt::Finalized(_)));
        let expiry_won = swept.len() == 1;
        assert!(quorum_won ^ expiry_won, "exactly one trigger commits");
        if expiry_won {
            assert!(matches!(vote, Err(VoteError::AlreadyDecided { .. })));
        }
        assert!(!service.get(application_id).expect("stored").is_pending());
        assert_eq!(notifier.count_for(application_id), 1);
    }
}
