use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::{FeatureToggles, ReviewConfig};
use crate::workflows::review::{
    review_router, Application, ApplicationId, Clock, DecisionOutcome, Notifier, NotifyError,
    ReviewService,
};

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Clock the tests move by hand.
pub(super) struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub(super) fn starting_at(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(start)))
    }

    pub(super) fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock lock")
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<(ApplicationId, DecisionOutcome)>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<(ApplicationId, DecisionOutcome)> {
        self.sent.lock().expect("notifier lock").clone()
    }

    pub(super) fn count_for(&self, id: ApplicationId) -> usize {
        self.sent().iter().filter(|(sent, _)| *sent == id).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(
        &self,
        application: &Application,
        outcome: &DecisionOutcome,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier lock")
            .push((application.id, outcome.clone()));
        Ok(())
    }
}

/// Notifier whose transport is always down.
#[derive(Default)]
pub(super) struct FailingNotifier {
    attempts: Mutex<usize>,
}

impl FailingNotifier {
    pub(super) fn attempts(&self) -> usize {
        *self.attempts.lock().expect("notifier lock")
    }
}

impl Notifier for FailingNotifier {
    fn notify(
        &self,
        _application: &Application,
        _outcome: &DecisionOutcome,
    ) -> Result<(), NotifyError> {
        *self.attempts.lock().expect("notifier lock") += 1;
        Err(NotifyError::Unreachable("gateway offline".to_string()))
    }
}

pub(super) fn review_config(quorum: usize) -> ReviewConfig {
    ReviewConfig {
        quorum,
        ..ReviewConfig::default()
    }
}

pub(super) fn restricted_config(quorum: usize, approvers: &[&str]) -> ReviewConfig {
    ReviewConfig {
        quorum,
        approvers: approvers.iter().map(|name| name.to_string()).collect::<BTreeSet<_>>(),
        ..ReviewConfig::default()
    }
}

pub(super) fn disabled_config() -> ReviewConfig {
    ReviewConfig {
        features: FeatureToggles {
            approvals: false,
            logging: true,
        },
        ..ReviewConfig::default()
    }
}

pub(super) fn build_service(
    config: &ReviewConfig,
) -> (
    ReviewService<RecordingNotifier>,
    Arc<RecordingNotifier>,
    Arc<ManualClock>,
) {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::starting_at(t0());
    let service = ReviewService::with_clock(config, notifier.clone(), clock.clone());
    (service, notifier, clock)
}

pub(super) fn router_with_service(service: ReviewService<RecordingNotifier>) -> axum::Router {
    review_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
