//! Configuration for chronicle
//!
//! JSON on disk, every field defaulted so an empty object is a valid config.
//!
//! ```json
//! {
//!   "ledger": { "max_events": 10000, "subscriber_capacity": 256 },
//!   "query": { "budget_ms": 250, "default_limit": 100, "journal_capacity": 1024 },
//!   "audit": { "interval_secs": 60, "spheres": ["personal", "work"] }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::LogEvent;

/// Configuration load or validation failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// Event ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Maximum number of live events kept in memory (default: 10000)
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Queue depth per subscriber before notifications are dropped (default: 256)
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

/// TQL query engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Execution budget per query in milliseconds (default: 250)
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,

    /// Result limit when a query names none (default: 100)
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Number of executed queries remembered for the audit engine (default: 1024)
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

/// Audit engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Seconds between cadence runs (default: 60)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Spheres that always get a blind-spot check, observed or not
    #[serde(default)]
    pub spheres: Vec<String>,

    /// Agent share of events above which dependency checks warn (default: 0.8)
    #[serde(default = "default_agent_share_warn")]
    pub agent_share_warn: f64,

    /// Minimum attributed events before share checks apply (default: 10)
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,
}

fn default_max_events() -> usize {
    10_000
}

fn default_subscriber_capacity() -> usize {
    256
}

fn default_budget_ms() -> u64 {
    250
}

fn default_limit() -> usize {
    100
}

fn default_journal_capacity() -> usize {
    1024
}

fn default_interval_secs() -> u64 {
    60
}

fn default_agent_share_warn() -> f64 {
    0.8
}

fn default_min_sample() -> usize {
    10
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            budget_ms: default_budget_ms(),
            default_limit: default_limit(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            spheres: Vec::new(),
            agent_share_warn: default_agent_share_warn(),
            min_sample: default_min_sample(),
        }
    }
}

impl LedgerConfig {
    /// Config with a specific retention bound
    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            max_events,
            ..Default::default()
        }
    }
}

impl Config {
    /// Load configuration from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config = Self::from_json(&content)?;

        tracing::info!(
            event = LogEvent::ConfigLoaded.as_str(),
            path = %path.display(),
            max_events = config.ledger.max_events,
            budget_ms = config.query.budget_ms,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a component unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.max_events == 0 {
            return Err(ConfigError::Invalid("ledger.max_events must be > 0".into()));
        }
        if self.ledger.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid(
                "ledger.subscriber_capacity must be > 0".into(),
            ));
        }
        if self.query.default_limit == 0 {
            return Err(ConfigError::Invalid("query.default_limit must be > 0".into()));
        }
        if self.query.journal_capacity == 0 {
            return Err(ConfigError::Invalid(
                "query.journal_capacity must be > 0".into(),
            ));
        }
        if self.audit.interval_secs == 0 {
            return Err(ConfigError::Invalid("audit.interval_secs must be > 0".into()));
        }
        if !(self.audit.agent_share_warn > 0.0 && self.audit.agent_share_warn <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "audit.agent_share_warn must be in (0, 1], got {}",
                self.audit.agent_share_warn
            )));
        }
        if self.audit.spheres.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid("audit.spheres must not contain blanks".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ledger.max_events, 10_000);
        assert_eq!(config.ledger.subscriber_capacity, 256);
        assert_eq!(config.query.budget_ms, 250);
        assert_eq!(config.query.default_limit, 100);
        assert_eq!(config.audit.interval_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_section() {
        let config = Config::from_json(r#"{"ledger": {"max_events": 5}}"#).unwrap();
        assert_eq!(config.ledger.max_events, 5);
        assert_eq!(config.ledger.subscriber_capacity, 256);
    }

    #[test]
    fn test_zero_bound_rejected() {
        let err = Config::from_json(r#"{"ledger": {"max_events": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_share_out_of_range_rejected() {
        let err = Config::from_json(r#"{"audit": {"agent_share_warn": 1.5}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"audit": {{"spheres": ["personal"]}}}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.audit.spheres, vec!["personal".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/chronicle.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
