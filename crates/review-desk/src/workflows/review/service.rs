use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::decision::{DecisionEngine, DecisionOutcome};
use super::domain::{
    ApplicantRef, Application, ApplicationId, ApproverRef, IntakeSource, ReviewMessageRef,
    VoteDecision,
};
use super::features::FeatureSwitches;
use super::ingress::{parse_reaction, parse_reply, IgnoreReason, IngressOutcome};
use super::notifier::Notifier;
use super::store::ApplicationStore;
use super::sweeper::ExpirySweeper;
use super::votes::{ApproverRoster, VoteCollector, VoteError, VoteReceipt};
use crate::config::{ConfigError, Feature, FeatureToggles, ReviewConfig};
use crate::workflows::intake::{
    ApplicantDirectory, ImportSummary, IntakeImportError, SpreadsheetImporter,
};

/// Source of "now" so expiry can be exercised without waiting a week.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Facade composing the store, vote collector and expiry sweeper.
pub struct ReviewService<N> {
    store: Arc<ApplicationStore>,
    collector: VoteCollector<N>,
    sweeper: ExpirySweeper<N>,
    clock: Arc<dyn Clock>,
    features: Arc<FeatureSwitches>,
    intake: Mutex<SpreadsheetImporter>,
}

impl<N> ReviewService<N>
where
    N: Notifier + 'static,
{
    pub fn new(config: &ReviewConfig, notifier: Arc<N>) -> Self {
        Self::with_clock(config, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ReviewConfig, notifier: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        let features = Arc::new(FeatureSwitches::from_config(config));
        Self::assemble(config, notifier, clock, features)
    }

    /// Service sharing switches that were built first, e.g. for a notifier that follows
    /// the `logging` switch.
    pub fn with_features(
        config: &ReviewConfig,
        notifier: Arc<N>,
        features: Arc<FeatureSwitches>,
    ) -> Self {
        Self::assemble(config, notifier, Arc::new(SystemClock), features)
    }

    fn assemble(
        config: &ReviewConfig,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        features: Arc<FeatureSwitches>,
    ) -> Self {
        let store = Arc::new(ApplicationStore::new());
        let engine = DecisionEngine::new(config.quorum);
        let roster = ApproverRoster::from_names(config.approvers.iter().cloned());
        let collector = VoteCollector::new(store.clone(), engine, roster, notifier.clone());
        let sweeper = ExpirySweeper::new(
            store.clone(),
            engine,
            notifier,
            clock.clone(),
            config.expiry_deadline,
            config.sweep_interval,
        );

        Self {
            store,
            collector,
            sweeper,
            clock,
            features,
            intake: Mutex::new(SpreadsheetImporter::new(ApplicantDirectory::passthrough())),
        }
    }

    /// Replaces the importer behind [`import_spreadsheet`](Self::import_spreadsheet).
    pub fn with_intake(mut self, importer: SpreadsheetImporter) -> Self {
        self.intake = Mutex::new(importer);
        self
    }

    pub fn store(&self) -> &Arc<ApplicationStore> {
        &self.store
    }

    pub fn quorum(&self) -> usize {
        self.collector.engine().quorum()
    }

    pub fn roster(&self) -> &ApproverRoster {
        self.collector.roster()
    }

    pub fn is_accepting(&self) -> bool {
        self.features.is_enabled(Feature::Approvals)
    }

    pub fn features(&self) -> FeatureToggles {
        self.features.snapshot()
    }

    /// Flips a feature switch for the running service and writes it to the settings file.
    pub fn set_feature(
        &self,
        feature: Feature,
        enabled: bool,
    ) -> Result<FeatureToggles, ReviewError> {
        Ok(self.features.set(feature, enabled)?)
    }

    /// Accepts a submission from a direct command.
    pub fn submit(
        &self,
        kind: impl Into<String>,
        applicant: Option<ApplicantRef>,
        content: impl Into<String>,
    ) -> Result<Application, ReviewError> {
        self.submit_from(IntakeSource::Command, kind, applicant, content)
    }

    pub fn submit_from(
        &self,
        source: IntakeSource,
        kind: impl Into<String>,
        applicant: Option<ApplicantRef>,
        content: impl Into<String>,
    ) -> Result<Application, ReviewError> {
        if !self.is_accepting() {
            return Err(ReviewError::ApprovalsDisabled);
        }

        let application =
            self.store
                .create(kind, applicant, content, source, self.clock.now());
        tracing::info!(
            application = %application.id,
            kind = %application.kind,
            applicant = ?application.applicant,
            source = ?application.source,
            "application submitted"
        );
        Ok(application)
    }

    /// Records which review-channel message announced the application.
    pub fn link_review_message(
        &self,
        application_id: ApplicationId,
        message: ReviewMessageRef,
    ) -> Result<(), ReviewError> {
        if self.store.link_message(application_id, message) {
            Ok(())
        } else {
            Err(ReviewError::NotFound(application_id))
        }
    }

    pub fn cast_vote(
        &self,
        application_id: ApplicationId,
        approver: ApproverRef,
        decision: VoteDecision,
    ) -> Result<VoteReceipt, VoteError> {
        self.collector
            .cast_vote(application_id, approver, decision, self.clock.now())
    }

    pub fn vote_via_reaction(
        &self,
        message: &ReviewMessageRef,
        approver: ApproverRef,
        emoji: &str,
    ) -> Result<IngressOutcome, ReviewError> {
        self.ingest(message, approver, parse_reaction(emoji))
    }

    pub fn vote_via_reply(
        &self,
        message: &ReviewMessageRef,
        approver: ApproverRef,
        text: &str,
    ) -> Result<IngressOutcome, ReviewError> {
        self.ingest(message, approver, parse_reply(text))
    }

    fn ingest(
        &self,
        message: &ReviewMessageRef,
        approver: ApproverRef,
        decision: Option<VoteDecision>,
    ) -> Result<IngressOutcome, ReviewError> {
        let Some(decision) = decision else {
            return Ok(IngressOutcome::Ignored(IgnoreReason::UnrecognizedInput));
        };
        let Some(application_id) = self.store.resolve_message(message) else {
            return Ok(IngressOutcome::Ignored(IgnoreReason::UnlinkedMessage));
        };

        match self.cast_vote(application_id, approver, decision) {
            Ok(receipt) => Ok(IngressOutcome::Counted(receipt)),
            Err(err) => match IgnoreReason::from_vote_error(&err) {
                Some(reason) => Ok(IngressOutcome::Ignored(reason)),
                None => Err(ReviewError::Vote(err)),
            },
        }
    }

    pub fn get(&self, application_id: ApplicationId) -> Result<Application, ReviewError> {
        self.store
            .get(application_id)
            .ok_or(ReviewError::NotFound(application_id))
    }

    /// Every application from one applicant, oldest first.
    pub fn history(&self, applicant: &ApplicantRef) -> Vec<Application> {
        self.store.list_by_applicant(applicant)
    }

    pub fn pending(&self) -> Vec<Application> {
        let mut pending = self.store.all_pending();
        pending.sort_by_key(|application| (application.created_at, application.id));
        pending
    }

    pub fn all(&self) -> Vec<Application> {
        self.store.all()
    }

    /// One expiry pass at the clock's current time.
    pub fn sweep_expired(&self) -> Vec<DecisionOutcome> {
        self.sweeper.sweep(self.clock.now())
    }

    /// Reads a spreadsheet export through the service's importer. Rows already taken in by an
    /// earlier call are counted as duplicates.
    pub fn import_spreadsheet<R: Read>(
        &self,
        reader: R,
    ) -> Result<ImportSummary, IntakeImportError> {
        let mut importer = self.intake.lock().unwrap_or_else(PoisonError::into_inner);
        importer.import_reader(reader, self)
    }

    /// Handle for the background sweep loop; see [`ExpirySweeper::spawn`].
    pub fn sweeper(&self) -> ExpirySweeper<N> {
        self.sweeper.clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("applications are not being accepted right now")]
    ApprovalsDisabled,
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("feature settings could not be saved: {0}")]
    Settings(#[from] ConfigError),
}
