//! Runtime configuration: retry policy, file locations, validator selection.
//!
//! ```yaml
//! retry:
//!   max_retries: 2
//!   initial_backoff: 1s
//!   max_backoff: 10s
//!   total_budget: 30s
//! ledger_path: .cadence/token-history.json
//! config_path: .cadence/ceremonies.yaml
//! selection:
//!   min: 5
//!   max: 8
//! classify_validators: false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use cadence_core::SelectionBounds;

#[derive(Error, Debug)]
pub enum RuntimeConfigError {
    #[error("Failed to read runtime config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse runtime config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid runtime config: {0}")]
    Invalid(String),
}

/// Bounded exponential backoff for retryable failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    #[serde(with = "humantime_duration")]
    pub initial_backoff: Duration,

    #[serde(with = "humantime_duration")]
    pub max_backoff: Duration,

    /// Wall-clock cap across all attempts and waits
    #[serde(with = "humantime_duration")]
    pub total_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            total_budget: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Configuration for the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub retry: RetryPolicy,

    /// Usage history file
    pub ledger_path: PathBuf,

    /// Ceremony configuration file
    pub config_path: PathBuf,

    /// How many validators a run may use
    pub selection: SelectionBounds,

    /// Ask the model to pick validators instead of using keyword rules
    pub classify_validators: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            ledger_path: PathBuf::from(".cadence/token-history.json"),
            config_path: PathBuf::from(".cadence/ceremonies.yaml"),
            selection: SelectionBounds::default(),
            classify_validators: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, RuntimeConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), RuntimeConfigError> {
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(RuntimeConfigError::Invalid(
                "retry.initial_backoff must not exceed retry.max_backoff".to_string(),
            ));
        }
        if self.retry.total_budget.is_zero() {
            return Err(RuntimeConfigError::Invalid(
                "retry.total_budget must be greater than zero".to_string(),
            ));
        }
        if self.selection.min > self.selection.max || self.selection.max == 0 {
            return Err(RuntimeConfigError::Invalid(format!(
                "selection bounds {}..{} are empty",
                self.selection.min, self.selection.max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.total_budget, Duration::from_secs(30));
        assert_eq!(config.selection, SelectionBounds { min: 5, max: 8 });
        assert!(!config.classify_validators);
    }

    #[test]
    fn test_parse_human_durations() {
        let config = RuntimeConfig::from_yaml(
            "retry:\n  max_retries: 4\n  initial_backoff: 250ms\n  total_budget: 1m\nclassify_validators: true\n",
        )
        .unwrap();
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(10));
        assert_eq!(config.retry.total_budget, Duration::from_secs(60));
        assert!(config.classify_validators);
        assert_eq!(config.ledger_path, PathBuf::from(".cadence/token-history.json"));
    }

    #[test]
    fn test_bad_duration_rejected() {
        assert!(RuntimeConfig::from_yaml("retry:\n  initial_backoff: soon\n").is_err());
    }

    #[test]
    fn test_inverted_backoff_rejected() {
        let err = RuntimeConfig::from_yaml("retry:\n  initial_backoff: 20s\n  max_backoff: 5s\n").unwrap_err();
        assert!(matches!(err, RuntimeConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load(dir.path().join("runtime.yaml")).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_serialized_durations_are_human_readable() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("total_budget: 30s"));
    }
}
