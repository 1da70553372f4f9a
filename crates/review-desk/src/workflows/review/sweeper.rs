use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::decision::{DecisionEngine, DecisionOutcome};
use super::notifier::{deliver, Notifier};
use super::service::Clock;
use super::store::ApplicationStore;

/// Periodic pass that force-finalizes applications left pending past the deadline.
pub struct ExpirySweeper<N> {
    store: Arc<ApplicationStore>,
    engine: DecisionEngine,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    deadline: chrono::Duration,
    period: StdDuration,
}

impl<N> Clone for ExpirySweeper<N> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            engine: self.engine,
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            deadline: self.deadline,
            period: self.period,
        }
    }
}

impl<N> ExpirySweeper<N>
where
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<ApplicationStore>,
        engine: DecisionEngine,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        deadline: chrono::Duration,
        period: StdDuration,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            clock,
            deadline,
            period,
        }
    }

    pub fn deadline(&self) -> chrono::Duration {
        self.deadline
    }

    pub fn period(&self) -> StdDuration {
        self.period
    }

    /// Finalizes every application whose age at `now` has reached the deadline.
    ///
    /// Candidates come from a snapshot; each one is re-checked under the store lock before
    /// committing, so a record decided by a vote in between is left alone.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<DecisionOutcome> {
        let candidates: Vec<_> = self
            .store
            .all_pending()
            .into_iter()
            .filter(|application| application.age(now) >= self.deadline)
            .map(|application| application.id)
            .collect();

        let mut finalized = Vec::new();
        for id in candidates {
            let committed = self.store.update(id, |application| {
                if application.age(now) < self.deadline {
                    return None;
                }
                let outcome = self.engine.expire(application)?;
                application
                    .commit(&outcome, now)
                    .then(|| (application.clone(), outcome))
            });

            if let Some(Some((application, outcome))) = committed {
                tracing::info!(
                    application = %application.id,
                    verdict = outcome.verdict.label(),
                    approvals = outcome.tally.approve,
                    denials = outcome.tally.deny,
                    "application finalized on expiry"
                );
                deliver(self.notifier.as_ref(), &application, &outcome);
                finalized.push(outcome);
            }
        }

        if !finalized.is_empty() {
            tracing::info!(expired = finalized.len(), "expiry sweep finalized applications");
        }
        finalized
    }

    /// Runs [`sweep`](Self::sweep) at the injected clock's time on a fixed period until the
    /// task is aborted. The first pass happens one full period after spawning.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep(self.clock.now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::review::decision::DecisionOutcome;
    use crate::workflows::review::domain::{
        Application, ApplicationStatus, IntakeSource, Verdict,
    };
    use crate::workflows::review::notifier::NotifyError;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<DecisionOutcome>>);

    impl Notifier for Recorder {
        fn notify(
            &self,
            _application: &Application,
            outcome: &DecisionOutcome,
        ) -> Result<(), NotifyError> {
            self.0.lock().expect("recorder lock").push(outcome.clone());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn sweeper_at(
        store: Arc<ApplicationStore>,
        notifier: Arc<Recorder>,
        now: DateTime<Utc>,
    ) -> ExpirySweeper<Recorder> {
        ExpirySweeper::new(
            store,
            DecisionEngine::new(3),
            notifier,
            Arc::new(FixedClock(now)),
            chrono::Duration::days(7),
            StdDuration::from_secs(3600),
        )
    }

    fn sweeper(store: Arc<ApplicationStore>, notifier: Arc<Recorder>) -> ExpirySweeper<Recorder> {
        sweeper_at(store, notifier, t0())
    }

    #[test]
    fn young_applications_survive_the_sweep() {
        let store = Arc::new(ApplicationStore::new());
        let notifier = Arc::new(Recorder::default());
        let application = store.create("tester", None, "", IntakeSource::Command, t0());

        let swept = sweeper(store.clone(), notifier.clone())
            .sweep(t0() + chrono::Duration::days(7) - chrono::Duration::seconds(1));

        assert!(swept.is_empty());
        assert!(store.get(application.id).expect("stored").is_pending());
        assert!(notifier.0.lock().expect("recorder lock").is_empty());
    }

    #[test]
    fn deadline_is_inclusive_and_repeat_sweeps_do_not_refire() {
        let store = Arc::new(ApplicationStore::new());
        let notifier = Arc::new(Recorder::default());
        let application = store.create("tester", None, "", IntakeSource::Command, t0());
        let sweeper = sweeper(store.clone(), notifier.clone());
        let deadline = t0() + chrono::Duration::days(7);

        let first = sweeper.sweep(deadline);
        let second = sweeper.sweep(deadline + chrono::Duration::hours(1));

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].verdict, Verdict::Denied);
        assert!(second.is_empty());
        assert_eq!(notifier.0.lock().expect("recorder lock").len(), 1);
        let stored = store.get(application.id).expect("stored");
        assert_eq!(stored.status, ApplicationStatus::Denied);
        assert_eq!(stored.decided_at, Some(deadline));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_sweeps_on_each_period() {
        let store = Arc::new(ApplicationStore::new());
        let notifier = Arc::new(Recorder::default());
        let application = store.create("tester", None, "", IntakeSource::Command, t0());
        let now = t0() + chrono::Duration::days(8);

        let handle = sweeper_at(store.clone(), notifier.clone(), now).spawn();

        tokio::time::sleep(StdDuration::from_secs(60)).await;
        assert_eq!(store.all_pending().len(), 1, "first pass waits one period");

        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        assert!(store.all_pending().is_empty());
        assert_eq!(notifier.0.lock().expect("recorder lock").len(), 1);
        let stored = store.get(application.id).expect("stored");
        assert_eq!(stored.decided_at, Some(now), "loop reads the injected clock");

        handle.abort();
    }
}
