use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub review: ReviewConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            review: ReviewConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Review workflow knobs, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewConfig {
    /// Number of unique votes that finalizes an application.
    pub quorum: usize,
    /// Age after which a pending application is force-finalized.
    pub expiry_deadline: chrono::Duration,
    /// How often the expiry sweeper wakes up.
    pub sweep_interval: StdDuration,
    /// Identities allowed to vote. Empty means anyone may vote.
    pub approvers: BTreeSet<String>,
    pub features: FeatureToggles,
    /// Settings file that runtime feature changes are written back to.
    pub settings_path: Option<PathBuf>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            quorum: 3,
            expiry_deadline: chrono::Duration::days(7),
            sweep_interval: StdDuration::from_secs(60 * 60),
            approvers: BTreeSet::new(),
            features: FeatureToggles::default(),
            settings_path: None,
        }
    }
}

impl ReviewConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let quorum = match env::var("REVIEW_QUORUM") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidQuorum)?,
            Err(_) => defaults.quorum,
        };

        let expiry_deadline = match env::var("REVIEW_EXPIRY_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .and_then(chrono::Duration::try_hours)
                .ok_or(ConfigError::InvalidExpiry)?,
            Err(_) => defaults.expiry_deadline,
        };

        let sweep_interval = match env::var("REVIEW_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(StdDuration::from_secs)
                .ok_or(ConfigError::InvalidSweepInterval)?,
            Err(_) => defaults.sweep_interval,
        };

        let mut approvers = env::var("REVIEW_APPROVERS")
            .map(|raw| parse_identity_list(&raw))
            .unwrap_or_default();

        let mut features = defaults.features;
        let mut settings_path = None;
        if let Ok(path) = env::var("REVIEW_SETTINGS_PATH") {
            let path = PathBuf::from(path);
            let settings = ReviewSettingsFile::load(&path)?;
            approvers.extend(
                settings
                    .approvers
                    .iter()
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty()),
            );
            features = settings.features;
            settings_path = Some(path);
        }

        Ok(Self {
            quorum,
            expiry_deadline,
            sweep_interval,
            approvers,
            features,
            settings_path,
        })
    }
}

/// Switches the bot owner can flip at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Approvals,
    Logging,
}

impl Feature {
    pub const fn label(self) -> &'static str {
        match self {
            Feature::Approvals => "approvals",
            Feature::Logging => "logging",
        }
    }
}

/// Per-deployment switches that the bot owner can flip without a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    /// Accept new applications into the review queue.
    pub approvals: bool,
    /// Log decision notifications.
    pub logging: bool,
}

impl FeatureToggles {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::Approvals => self.approvals,
            Feature::Logging => self.logging,
        }
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        match feature {
            Feature::Approvals => self.approvals = enabled,
            Feature::Logging => self.logging = enabled,
        }
    }
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            approvals: true,
            logging: true,
        }
    }
}

/// Shape of the optional JSON settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettingsFile {
    pub approvers: Vec<String>,
    pub features: FeatureToggles,
}

impl ReviewSettingsFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::SettingsWrite {
            path: path.to_path_buf(),
            source,
        };
        let rendered = serde_json::to_string_pretty(self)
            .map_err(|err| write_error(std::io::Error::from(err)))?;
        std::fs::write(path, rendered).map_err(write_error)
    }

    /// Rewrites only the feature block, keeping the approver list already on disk.
    pub fn store_features(
        path: impl AsRef<Path>,
        features: FeatureToggles,
    ) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let mut settings = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        settings.features = features;
        settings.save(path)
    }
}

fn parse_identity_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidQuorum,
    InvalidExpiry,
    InvalidSweepInterval,
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },
    SettingsParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    SettingsWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidQuorum => {
                write!(f, "REVIEW_QUORUM must be a positive integer")
            }
            ConfigError::InvalidExpiry => {
                write!(f, "REVIEW_EXPIRY_HOURS must be a positive number of hours")
            }
            ConfigError::InvalidSweepInterval => write!(
                f,
                "REVIEW_SWEEP_INTERVAL_SECS must be a positive number of seconds"
            ),
            ConfigError::SettingsRead { path, .. } => {
                write!(f, "unable to read settings file {}", path.display())
            }
            ConfigError::SettingsParse { path, .. } => {
                write!(f, "settings file {} is not valid JSON", path.display())
            }
            ConfigError::SettingsWrite { path, .. } => {
                write!(f, "unable to write settings file {}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::SettingsRead { source, .. } => Some(source),
            ConfigError::SettingsParse { source, .. } => Some(source),
            ConfigError::SettingsWrite { source, .. } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidQuorum
            | ConfigError::InvalidExpiry
            | ConfigError::InvalidSweepInterval => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "REVIEW_QUORUM",
            "REVIEW_EXPIRY_HOURS",
            "REVIEW_SWEEP_INTERVAL_SECS",
            "REVIEW_APPROVERS",
            "REVIEW_SETTINGS_PATH",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.review, ReviewConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn review_settings_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REVIEW_QUORUM", "5");
        env::set_var("REVIEW_EXPIRY_HOURS", "48");
        env::set_var("REVIEW_SWEEP_INTERVAL_SECS", "90");
        env::set_var("REVIEW_APPROVERS", "mod-a, mod-b,,mod-a");

        let review = ReviewConfig::from_env().expect("review config loads");
        assert_eq!(review.quorum, 5);
        assert_eq!(review.expiry_deadline, chrono::Duration::hours(48));
        assert_eq!(review.sweep_interval, StdDuration::from_secs(90));
        assert_eq!(
            review.approvers.iter().cloned().collect::<Vec<_>>(),
            vec!["mod-a".to_string(), "mod-b".to_string()]
        );
        reset_env();
    }

    #[test]
    fn zero_quorum_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REVIEW_QUORUM", "0");
        assert!(matches!(
            ReviewConfig::from_env(),
            Err(ConfigError::InvalidQuorum)
        ));
        reset_env();
    }

    #[test]
    fn out_of_range_expiry_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REVIEW_EXPIRY_HOURS", "9999999999999");
        assert!(matches!(
            ReviewConfig::from_env(),
            Err(ConfigError::InvalidExpiry)
        ));
        env::set_var("REVIEW_EXPIRY_HOURS", "-4");
        assert!(matches!(
            ReviewConfig::from_env(),
            Err(ConfigError::InvalidExpiry)
        ));
        reset_env();
    }

    #[test]
    fn storing_features_keeps_approvers_on_disk() {
        let path = env::temp_dir().join(format!(
            "review-settings-store-{}.json",
            std::process::id()
        ));
        ReviewSettingsFile {
            approvers: vec!["owner".to_string()],
            features: FeatureToggles::default(),
        }
        .save(&path)
        .expect("save settings");

        let mut toggles = FeatureToggles::default();
        toggles.set(Feature::Logging, false);
        ReviewSettingsFile::store_features(&path, toggles).expect("store features");

        let reloaded = ReviewSettingsFile::load(&path).expect("reload settings");
        assert_eq!(reloaded.approvers, vec!["owner".to_string()]);
        assert!(reloaded.features.approvals);
        assert!(!reloaded.features.get(Feature::Logging));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn settings_file_merges_approvers_and_features() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let path = env::temp_dir().join(format!("review-settings-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "approvers": ["owner"], "features": { "approvals": false } }"#,
        )
        .expect("write settings");
        env::set_var("REVIEW_APPROVERS", "mod-a");
        env::set_var("REVIEW_SETTINGS_PATH", &path);

        let review = ReviewConfig::from_env().expect("settings load");
        assert!(review.approvers.contains("owner"));
        assert!(review.approvers.contains("mod-a"));
        assert!(!review.features.approvals);
        assert!(review.features.logging);
        assert_eq!(review.settings_path.as_deref(), Some(path.as_path()));

        std::fs::remove_file(&path).ok();
        reset_env();
    }

    #[test]
    fn missing_settings_file_reports_path() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REVIEW_SETTINGS_PATH", "./no-such-settings.json");
        match ReviewConfig::from_env() {
            Err(ConfigError::SettingsRead { path, .. }) => {
                assert_eq!(path, PathBuf::from("./no-such-settings.json"));
            }
            other => panic!("expected settings read error, got {other:?}"),
        }
        reset_env();
    }
}
