//! Configuration for test runs.

use crate::error::{E2eError, Result};
use crate::poller::PollSchedule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "E2E_CONFIG";
/// Configuration file used when `E2E_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "e2e.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default polling schedule.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Run-level settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| E2eError::ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
            toml::from_str(&content)
                .map_err(|e| E2eError::ConfigError(format!("failed to parse {}: {}", path.display(), e)))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)
            .map_err(|e| E2eError::ConfigError(format!("failed to write {}: {}", path.display(), e)))
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| E2eError::ConfigError(format!("failed to serialize config: {}", e)))
    }

    /// Load the file named by `E2E_CONFIG` (or `e2e.toml`) and apply
    /// `E2E_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load(&path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognised: `E2E_POLL_INTERVAL_MS`, `E2E_POLL_DELAY_MS`,
    /// `E2E_EXPECTED_TESTS`, `E2E_LOG`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("E2E_POLL_INTERVAL_MS") {
            self.polling.interval_ms = parse_var("E2E_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("E2E_POLL_DELAY_MS") {
            self.polling.delay_ms = parse_var("E2E_POLL_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("E2E_EXPECTED_TESTS") {
            self.run.expected_tests = Some(parse_var("E2E_EXPECTED_TESTS", &v)?);
        }
        if let Some(v) = lookup("E2E_LOG") {
            self.logging.filter = v;
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| E2eError::ConfigError(format!("invalid {}={:?}: {}", name, value, e)))
}

/// Default polling schedule and latency budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Pause between probe invocations in milliseconds (default: 2000).
    pub interval_ms: u64,

    /// Pause before the first probe in milliseconds (default: 1000).
    pub delay_ms: u64,

    /// Timeout for eventual-consistency assertions in seconds (default: 30).
    pub eventual_consistency_secs: u64,

    /// Latency budget for a full pipeline operation in seconds (default: 60).
    pub pipeline_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: PollSchedule::DEFAULT_INTERVAL.as_millis() as u64,
            delay_ms: PollSchedule::DEFAULT_DELAY.as_millis() as u64,
            eventual_consistency_secs: 30,
            pipeline_timeout_secs: 60,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn eventual_consistency(&self) -> Duration {
        Duration::from_secs(self.eventual_consistency_secs)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }

    /// Schedule for `timeout` using the configured interval and delay.
    pub fn schedule(&self, timeout: Duration) -> PollSchedule {
        PollSchedule::new(timeout)
            .with_interval(self.interval())
            .with_delay(self.delay())
    }

    /// Schedule bounded by the eventual-consistency timeout.
    pub fn eventual_schedule(&self) -> PollSchedule {
        self.schedule(self.eventual_consistency())
    }
}

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Prefix of the per-test actor identity (default: "test_user").
    pub user_prefix: String,

    /// Number of tests in the run. When set, the last test to finish runs
    /// the after-all cleanup.
    pub expected_tests: Option<usize>,

    /// Optional JSON-lines file receiving report attachments.
    pub attachments_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            user_prefix: "test_user".to_string(),
            expected_tests: None,
            attachments_path: None,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset (default: "info").
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
