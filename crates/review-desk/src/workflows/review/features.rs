use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{ConfigError, Feature, FeatureToggles, ReviewConfig, ReviewSettingsFile};

/// Live feature switches shared by the service and its notifier.
///
/// Flips are written back to the settings file (when one was configured) before they take
/// effect, so a restart comes up with the same switches.
#[derive(Debug)]
pub struct FeatureSwitches {
    approvals: AtomicBool,
    logging: Arc<AtomicBool>,
    settings_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl FeatureSwitches {
    pub fn new(toggles: FeatureToggles, settings_path: Option<PathBuf>) -> Self {
        Self {
            approvals: AtomicBool::new(toggles.approvals),
            logging: Arc::new(AtomicBool::new(toggles.logging)),
            settings_path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(config.features, config.settings_path.clone())
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.flag(feature).load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> FeatureToggles {
        FeatureToggles {
            approvals: self.is_enabled(Feature::Approvals),
            logging: self.is_enabled(Feature::Logging),
        }
    }

    pub fn settings_path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    /// Shared handle on the logging flag for notifiers built before the service.
    pub fn logging_switch(&self) -> Arc<AtomicBool> {
        self.logging.clone()
    }

    /// Flips one switch and returns the full set after the change.
    ///
    /// A failed write leaves the in-memory switch untouched.
    pub fn set(&self, feature: Feature, enabled: bool) -> Result<FeatureToggles, ConfigError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut toggles = self.snapshot();
        toggles.set(feature, enabled);
        if let Some(path) = &self.settings_path {
            ReviewSettingsFile::store_features(path, toggles)?;
        }
        self.flag(feature).store(enabled, Ordering::Release);

        tracing::info!(
            feature = feature.label(),
            enabled,
            persisted = self.settings_path.is_some(),
            "feature switch updated"
        );
        Ok(toggles)
    }

    fn flag(&self, feature: Feature) -> &AtomicBool {
        match feature {
            Feature::Approvals => &self.approvals,
            Feature::Logging => self.logging.as_ref(),
        }
    }
}

impl Default for FeatureSwitches {
    fn default() -> Self {
        Self::new(FeatureToggles::default(), None)
    }
}
