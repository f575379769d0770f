//! Configuration management for adwatch.
//!
//! Configuration is read from `~/.config/adwatch/config.toml` (or the path
//! given with `--config`) once at startup and never changes afterwards.
//! If the file doesn't exist, a commented template is written and startup
//! stops so the operator can fill in the sources. Secrets may come from the
//! environment or a `.env` file instead of the file itself.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::{IdentityRule, Source};
use crate::fetcher::FetcherConfig;
use crate::notifier::NotifierConfig;
use crate::scheduler::SchedulerConfig;

/// Environment variable holding the SMTP password.
pub const SMTP_PASSWORD_ENV: &str = "ADWATCH_SMTP_PASSWORD";

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// CSS selector matching one element per listing
    pub post_selector: String,
    /// Minutes to sleep between cycles (default: 15)
    pub interval_minutes: u64,
    pub identity: IdentityRule,
    /// Defaults to `<data dir>/adwatch/known_posts.db`
    pub database_path: Option<PathBuf>,
    /// Forget identities first seen more than this many days ago. Unset keeps
    /// everything forever.
    pub retention_days: Option<u64>,
    pub sources: Vec<Source>,
    pub fetcher: FetcherConfig,
    pub scheduler: SchedulerConfig,
    pub notifier: NotifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            post_selector: String::new(),
            interval_minutes: 15,
            identity: IdentityRule::default(),
            database_path: None,
            retention_days: None,
            sources: Vec::new(),
            fetcher: FetcherConfig::default(),
            scheduler: SchedulerConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Err(ConfigError::Created(config_path));
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let mut config = Self::parse(&content, &config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/adwatch/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("adwatch").join("config.toml"))
    }

    /// Resolve the identity store location, creating its directory.
    pub fn resolve_database_path(&self) -> Result<PathBuf, ConfigError> {
        let path = match self.database_path {
            Some(ref p) => p.clone(),
            None => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("adwatch")
                .join("known_posts.db"),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        Ok(path)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .and_then(|days| i64::try_from(days).ok())
            .and_then(chrono::Duration::try_days)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref mut smtp) = self.notifier.smtp {
            if let Some(password) = lookup(SMTP_PASSWORD_ENV).filter(|p| !p.is_empty()) {
                smtp.password = Some(password);
            }
        }
    }

    /// Check everything the core assumes about its configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.post_selector.trim().is_empty() {
            return Err(ConfigError::Invalid("post_selector must be set".into()));
        }
        if self.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "interval_minutes must be greater than zero".into(),
            ));
        }
        if self.interval_minutes.checked_mul(60).is_none() {
            return Err(ConfigError::Invalid("interval_minutes is too large".into()));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[sources]] entry is required".into(),
            ));
        }

        let mut labels = HashSet::new();
        for source in &self.sources {
            if source.label.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "source {} has an empty label",
                    source.url
                )));
            }
            if !labels.insert(source.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source label '{}'",
                    source.label
                )));
            }
            let url = Url::parse(&source.url).map_err(|e| {
                ConfigError::Invalid(format!("source '{}': invalid url: {}", source.label, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "source '{}': url must be http or https",
                    source.label
                )));
            }
        }

        if let Some(days) = self.retention_days {
            if days == 0 {
                return Err(ConfigError::Invalid(
                    "retention_days must be greater than zero (omit it to keep everything)".into(),
                ));
            }
            let cutoff = self
                .retention()
                .and_then(|retention| chrono::Utc::now().checked_sub_signed(retention));
            if cutoff.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "retention_days = {} is too large",
                    days
                )));
            }
        }

        if self.fetcher.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.timeout_secs must be greater than zero".into(),
            ));
        }

        let threshold = self.scheduler.idle_threshold_percent;
        if !(threshold > 0.0 && threshold <= 100.0) {
            return Err(ConfigError::Invalid(
                "scheduler.idle_threshold_percent must be in (0, 100]".into(),
            ));
        }

        if let Some(ref smtp) = self.notifier.smtp {
            if smtp.username.is_empty() || smtp.from.is_empty() {
                return Err(ConfigError::Invalid(
                    "notifier.smtp: username and from are required".into(),
                ));
            }
            if smtp.to.is_empty() {
                return Err(ConfigError::Invalid(
                    "notifier.smtp: at least one recipient is required".into(),
                ));
            }
            if smtp.password.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "notifier.smtp: password missing (set {} or password)",
                    SMTP_PASSWORD_ENV
                )));
            }
        }

        Ok(())
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# adwatch configuration
#
# Every source is polled once per cycle; all new listings found in a cycle
# are sent in a single notification.

# CSS selector matching one element per listing. The element itself, or its
# first <a>, provides the listing link and title.
post_selector = ".item"

# Minutes between polling cycles
interval_minutes = 15

# How listings are identified: "link" or "title_and_link".
# Changing this on an existing database re-alerts every listing once.
identity = "link"

# Where known listings are stored (default: <data dir>/adwatch/known_posts.db)
# database_path = "/var/lib/adwatch/known_posts.db"

# Forget listings first seen more than this many days ago (default: never)
# retention_days = 365

# [[sources]]
# label = "Toyota Aqua"
# url = "https://example.com/search?q=aqua"

[fetcher]
# "http" for plain pages, "chrome" for pages rendered by JavaScript
backend = "http"

# Upper bound on fetching one source, in seconds
timeout_secs = 10

# Chrome only: wait this long for posts to appear after load (milliseconds)
wait_for_posts_ms = 5000

[scheduler]
# Cores below this utilisation (percent) count as idle; one worker per idle core
idle_threshold_percent = 10.0

# CPU sampling window in milliseconds
sample_window_ms = 1000

# Without [notifier.smtp] new listings are only written to the log.
# [notifier.smtp]
# host = "smtp.gmail.com"
# port = 465
# username = "you@example.com"
# from = "you@example.com"
# to = ["you@example.com"]
# subject = "New Listings Alert"
# The password is read from ADWATCH_SMTP_PASSWORD (a .env file works too).
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Created a default config file at {0}; add your sources and run again")]
    Created(PathBuf),

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
