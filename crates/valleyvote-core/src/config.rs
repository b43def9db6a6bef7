//! Run configuration. Every field has a default; a JSON file may override any
//! subset, and the CLI overrides the rest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::MentionOrigin;
use crate::resolve::{COMMITTEE_MATCH_THRESHOLD, DEFAULT_MATCH_THRESHOLD, DEFAULT_TIE_EPSILON};

pub const DEFAULT_API_BASE_URL: &str = "https://api.legiscan.com/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Two-letter state code, e.g. "ID".
    pub state: String,
    pub year_start: i32,
    pub year_end: i32,
    pub data_dir: PathBuf,
    pub api_base_url: String,
    /// Sessions processed at once.
    pub concurrency: usize,
    /// Upper bound on one request attempt.
    pub request_timeout_secs: u64,
    /// Scraped mentions to resolve after sync, if any.
    pub mentions_file: Option<PathBuf>,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub matching: MatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state: "ID".into(),
            year_start: 2023,
            year_end: 2024,
            data_dir: PathBuf::from("data"),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            concurrency: 2,
            request_timeout_secs: 45,
            mentions_file: None,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            matching: MatchConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state.trim().len() != 2 {
            return Err(ConfigError::Invalid(format!(
                "state must be a two-letter code, got {:?}",
                self.state
            )));
        }
        if self.year_start > self.year_end {
            return Err(ConfigError::Invalid(format!(
                "year range {}-{} is reversed",
                self.year_start, self.year_end
            )));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request timeout must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        if self.rate_limit.max_in_flight == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_in_flight must be at least 1".into()));
        }
        if self.rate_limit.jitter_below_ms > self.rate_limit.min_interval_ms {
            return Err(ConfigError::Invalid(
                "rate_limit.jitter_below_ms exceeds min_interval_ms".into(),
            ));
        }
        for (name, t) in [
            ("matching.threshold", self.matching.threshold),
            ("matching.committee_threshold", self.matching.committee_threshold),
        ] {
            if !(0.0..=100.0).contains(&t) {
                return Err(ConfigError::Invalid(format!("{name} {t} outside 0-100")));
            }
        }
        if self.matching.tie_epsilon.is_nan() || self.matching.tie_epsilon < 0.0 {
            return Err(ConfigError::Invalid("matching.tie_epsilon must be non-negative".into()));
        }
        Ok(())
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

/// Request spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_interval_ms: u64,
    /// Jitter is drawn from `-jitter_below_ms..=jitter_above_ms`.
    pub jitter_below_ms: u64,
    pub jitter_above_ms: u64,
    pub max_in_flight: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_100,
            jitter_below_ms: 200,
            jitter_above_ms: 400,
            max_in_flight: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub threshold: f64,
    pub committee_threshold: f64,
    pub tie_epsilon: f64,
    pub narrow_by_context: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            committee_threshold: COMMITTEE_MATCH_THRESHOLD,
            tie_epsilon: DEFAULT_TIE_EPSILON,
            narrow_by_context: true,
        }
    }
}

impl MatchConfig {
    /// Committee rosters use their own threshold; everything else the default.
    pub fn threshold_for(&self, origin: &MentionOrigin) -> f64 {
        match origin {
            MentionOrigin::CommitteeRoster => self.committee_threshold,
            _ => self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.matching.threshold, 88.0);
        assert_eq!(config.matching.committee_threshold, 85.0);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.request_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"state": "WA", "retry": {"max_attempts": 2}, "matching": {"threshold": 90}}"#,
        )
        .unwrap();
        assert_eq!(config.state, "WA");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.matching.threshold, 90.0);
        assert_eq!(config.matching.committee_threshold, 85.0);
        assert_eq!(config.concurrency, 2);
    }

    #[test]
    fn rejects_bad_values() {
        let reversed = Config {
            year_start: 2025,
            year_end: 2024,
            ..Config::default()
        };
        assert!(matches!(reversed.validate(), Err(ConfigError::Invalid(_))));

        let mut threshold = Config::default();
        threshold.matching.threshold = 101.0;
        assert!(threshold.validate().is_err());

        let zero = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(zero.validate().is_err());

        let mut attempts = Config::default();
        attempts.retry.max_attempts = 0;
        assert!(attempts.validate().is_err());
    }

    #[test]
    fn threshold_by_origin() {
        let m = MatchConfig::default();
        assert_eq!(m.threshold_for(&MentionOrigin::CommitteeRoster), 85.0);
        assert_eq!(m.threshold_for(&MentionOrigin::FinanceFiler), 88.0);
        assert_eq!(m.threshold_for(&MentionOrigin::Other("news".into())), 88.0);
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"year_start": 2019, "year_end": 2020}"#).unwrap();
        let config = Config::from_json_file(&path).unwrap();
        assert_eq!((config.year_start, config.year_end), (2019, 2020));
        assert!(matches!(
            Config::from_json_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
