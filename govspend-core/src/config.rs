//! Loader configuration.
//!
//! One immutable [`LoaderConfig`] is built at startup (TOML file, then CLI
//! overrides) and handed to every stage. Nothing reads process-wide state.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for a load run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base URL of the spending API (no trailing slash needed).
    pub api_base_url: String,
    /// SQLite warehouse file.
    pub database_path: PathBuf,
    /// CSV file receiving one row per abandoned partition.
    pub failure_log_path: PathBuf,
    /// First fiscal year to load (inclusive).
    pub first_fiscal_year: i32,
    /// Last fiscal year to load (inclusive).
    pub last_fiscal_year: i32,
    pub retry: RetryConfig,
    pub transport: TransportConfig,
    /// Random pause before every partition request.
    pub pacing: IntervalConfig,
    /// Random pause after a partition is abandoned.
    pub cooldown: IntervalConfig,
    pub resume: ResumeConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.usaspending.gov".into(),
            database_path: PathBuf::from("govspend.db"),
            failure_log_path: PathBuf::from("failed_calls.csv"),
            first_fiscal_year: 2018,
            last_fiscal_year: 2025,
            retry: RetryConfig::default(),
            transport: TransportConfig::default(),
            pacing: IntervalConfig::new(0.25, 0.55),
            cooldown: IntervalConfig::new(6.0, 12.0),
            resume: ResumeConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string. Missing keys take defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fiscal years to process, in ascending order.
    pub fn fiscal_years(&self) -> RangeInclusive<i32> {
        self.first_fiscal_year..=self.last_fiscal_year
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for year in [self.first_fiscal_year, self.last_fiscal_year] {
            if !(1900..=9999).contains(&year) {
                return Err(ConfigError::Invalid(format!(
                    "fiscal year {year} outside 1900..=9999"
                )));
            }
        }
        if self.first_fiscal_year > self.last_fiscal_year {
            return Err(ConfigError::Invalid(format!(
                "first_fiscal_year {} is after last_fiscal_year {}",
                self.first_fiscal_year, self.last_fiscal_year
            )));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url is empty".into()));
        }
        self.retry.validate()?;
        self.transport.validate()?;
        self.pacing.validate("pacing")?;
        self.cooldown.validate("cooldown")?;
        Ok(())
    }
}

/// Domain-level retry budget for one partition fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per partition, including the first.
    pub max_attempts: u32,
    /// Backoff unit: attempt `n` waits `base_sleep_secs * n` plus jitter.
    pub base_sleep_secs: f64,
    /// Jitter cap after a 429.
    pub rate_limit_jitter_secs: f64,
    /// Jitter cap after any other non-success status.
    pub status_jitter_secs: f64,
    /// Jitter cap after a connection-level fault.
    pub connection_jitter_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_sleep_secs: 1.5,
            rate_limit_jitter_secs: 0.8,
            status_jitter_secs: 1.0,
            connection_jitter_secs: 1.2,
        }
    }
}

impl RetryConfig {
    /// Linear backoff for `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.base_sleep_secs * f64::from(attempt))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        for (name, value) in [
            ("retry.base_sleep_secs", self.base_sleep_secs),
            ("retry.rate_limit_jitter_secs", self.rate_limit_jitter_secs),
            ("retry.status_jitter_secs", self.status_jitter_secs),
            ("retry.connection_jitter_secs", self.connection_jitter_secs),
        ] {
            check_seconds(name, value)?;
        }
        Ok(())
    }
}

/// Transport-level (per HTTP call) retry and pooling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Retries inside a single logical request. 0 disables the layer.
    pub max_retries: u32,
    /// Retry `n` waits `backoff_factor * 2^(n-1)` seconds.
    pub backoff_factor: f64,
    /// Statuses retried by the transport layer.
    pub status_forcelist: Vec<u16>,
    pub pool_max_idle_per_host: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: 0.8,
            status_forcelist: vec![429, 500, 502, 503, 504],
            pool_max_idle_per_host: 20,
            timeout_secs: 90,
            user_agent: concat!("govspend/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl TransportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_seconds("transport.backoff_factor", self.backoff_factor)?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("transport.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// A closed interval of seconds sampled uniformly. Omitted bounds are zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntervalConfig {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl IntervalConfig {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    /// A zero-length interval (no pause).
    pub const fn none() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Draw a duration uniformly from `[min_secs, max_secs]`.
    ///
    /// Bounds given in the wrong order are swapped, and a bound that is not a
    /// non-negative finite number counts as zero.
    pub fn sample(&self) -> Duration {
        let clean = |secs: f64| if secs.is_finite() && secs > 0.0 { secs } else { 0.0 };
        let (a, b) = (clean(self.min_secs), clean(self.max_secs));
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let secs = rand::thread_rng().gen_range(lo..=hi);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        check_seconds(&format!("{name}.min_secs"), self.min_secs)?;
        check_seconds(&format!("{name}.max_secs"), self.max_secs)?;
        if self.min_secs > self.max_secs {
            return Err(ConfigError::Invalid(format!(
                "{name}: min_secs {} exceeds max_secs {}",
                self.min_secs, self.max_secs
            )));
        }
        Ok(())
    }
}

/// Where to pick up a previously interrupted run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResumeConfig {
    /// Agency display name to start from; empty means the first agency.
    pub agency: String,
    /// Fiscal years below this are skipped once processing has started.
    pub fiscal_year: Option<i32>,
}

fn check_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{name} must be a non-negative number of seconds, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = LoaderConfig::default();
        assert_eq!(config.fiscal_years().collect::<Vec<_>>(), (2018..=2025).collect::<Vec<_>>());
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.transport.status_forcelist, vec![429, 500, 502, 503, 504]);
        assert_eq!(config.failure_log_path, PathBuf::from("failed_calls.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = LoaderConfig::from_toml(
            r#"
first_fiscal_year = 2020
last_fiscal_year = 2021

[retry]
max_attempts = 3

[resume]
agency = "Department of Energy"
fiscal_year = 2021
"#,
        )
        .unwrap();
        assert_eq!(config.fiscal_years().count(), 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_sleep_secs, 1.5);
        assert_eq!(config.resume.agency, "Department of Energy");
        assert_eq!(config.resume.fiscal_year, Some(2021));
        assert_eq!(config.cooldown, IntervalConfig::new(6.0, 12.0));
    }

    #[test]
    fn rejects_inverted_year_range() {
        let err = LoaderConfig::from_toml("first_fiscal_year = 2025\nlast_fiscal_year = 2018")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = LoaderConfig::from_toml("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn rejects_inverted_interval() {
        let err = LoaderConfig::from_toml("[pacing]\nmin_secs = 2.0\nmax_secs = 1.0").unwrap_err();
        assert!(err.to_string().contains("pacing"));
    }

    #[test]
    fn rejects_negative_seconds() {
        let err = LoaderConfig::from_toml("[retry]\nbase_sleep_secs = -1.0").unwrap_err();
        assert!(err.to_string().contains("base_sleep_secs"));
    }

    #[test]
    fn interval_table_fills_missing_bound() {
        let config = LoaderConfig::from_toml(
            r#"
[pacing]
max_secs = 1.0
"#,
        )
        .unwrap();
        assert_eq!(config.pacing, IntervalConfig::new(0.0, 1.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sample_tolerates_unvalidated_bounds() {
        let inverted = IntervalConfig::new(3.0, 1.0);
        for _ in 0..50 {
            let d = inverted.sample();
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(3));
        }
        assert_eq!(IntervalConfig::new(f64::NAN, -2.0).sample(), Duration::ZERO);
        assert_eq!(IntervalConfig::none().sample(), Duration::ZERO);
    }

    #[test]
    fn backoff_is_linear_in_attempt() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(1), Duration::from_secs_f64(1.5));
        assert_eq!(retry.backoff(4), Duration::from_secs_f64(6.0));
    }

    #[test]
    fn interval_sample_stays_in_bounds() {
        let interval = IntervalConfig::new(0.25, 0.55);
        for _ in 0..200 {
            let d = interval.sample().as_secs_f64();
            assert!((0.25..=0.55).contains(&d), "sample {d} out of bounds");
        }
        assert_eq!(IntervalConfig::none().sample(), Duration::ZERO);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = LoaderConfig::from_file(Path::new("/nonexistent/govspend.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/govspend.toml"));
    }
}
