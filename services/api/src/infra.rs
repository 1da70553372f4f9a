use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use review_desk::workflows::review::{
    Application, Clock, DecisionOutcome, Notification, Notifier, NotifyError,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier that keeps rendered decisions in memory instead of posting them.
#[derive(Default, Clone)]
pub(crate) struct InMemoryOutbox {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl Notifier for InMemoryOutbox {
    fn notify(
        &self,
        application: &Application,
        outcome: &DecisionOutcome,
    ) -> Result<(), NotifyError> {
        let mut guard = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push(Notification::from_decision(application, outcome));
        Ok(())
    }
}

impl InMemoryOutbox {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Clock the demo advances by hand to show expiry without waiting.
pub(crate) struct SteppedClock {
    now: Mutex<DateTime<Utc>>,
}

impl SteppedClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
