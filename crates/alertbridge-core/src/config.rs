//! Configuration management for AlertBridge
//!
//! Settings come from an optional file (TOML, YAML or JSON, picked by
//! extension) overlaid with `ALERTBRIDGE__SECTION__KEY` environment variables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alerting::DEFAULT_MAX_MISSING_SAMPLES;
use crate::error::{Error, Result};
use crate::models::{Rule, RuleConfig, SEVERITY_CLEAR, SEVERITY_CRITICAL};

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "ALERTBRIDGE";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metrics source configuration
    pub graphite: GraphiteConfig,

    /// Event manager configuration
    pub zenoss: ZenossConfig,

    /// Evaluation and state configuration
    pub evaluation: EvaluationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Threshold rules, evaluated in order
    pub rules: Vec<RuleConfig>,
}

impl Config {
    /// Load and validate configuration from `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check required settings and rule definitions
    pub fn validate(&self) -> Result<()> {
        require_url("graphite.url", &self.graphite.url)?;
        require_url("zenoss.url", &self.zenoss.url)?;
        require("zenoss.username", &self.zenoss.username)?;
        require("zenoss.password", &self.zenoss.password)?;

        if self.evaluation.max_fetch_failures == 0 {
            return Err(Error::config(
                "evaluation.max_fetch_failures must be at least 1",
            ));
        }

        let mut titles = HashSet::new();
        for rule in &self.rules {
            if rule.title.trim().is_empty() {
                return Err(Error::validation("rule title must not be empty"));
            }
            if rule.title.chars().any(char::is_control) {
                return Err(Error::validation(format!(
                    "rule title {:?} contains control characters",
                    rule.title
                )));
            }
            if !titles.insert(rule.title.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate rule title '{}'",
                    rule.title
                )));
            }
            if rule.metric.trim().is_empty() {
                return Err(Error::validation(format!(
                    "rule '{}' has no metric",
                    rule.title
                )));
            }
            if rule.severity <= SEVERITY_CLEAR || rule.severity > SEVERITY_CRITICAL {
                return Err(Error::validation(format!(
                    "rule '{}' severity {} is outside {}..={}",
                    rule.title,
                    rule.severity,
                    SEVERITY_CLEAR + 1,
                    SEVERITY_CRITICAL
                )));
            }
            for threshold in [rule.max, rule.min, rule.roc].into_iter().flatten() {
                if !threshold.is_finite() {
                    return Err(Error::validation(format!(
                        "rule '{}' has a non-finite threshold",
                        rule.title
                    )));
                }
            }
            if !rule.has_threshold() {
                warn!(rule = %rule.title, "Rule has no threshold configured and will never be evaluated");
            }
        }

        Ok(())
    }

    /// Concrete rules, in configured order
    pub fn rules(&self) -> Vec<Rule> {
        self.rules.iter().flat_map(RuleConfig::rules).collect()
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config(format!("{name} is required")));
    }
    Ok(())
}

fn require_url(name: &str, value: &str) -> Result<()> {
    require(name, value)?;

    let parsed = url::Url::parse(value)
        .map_err(|e| Error::config(format!("{name} is not a valid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::config(format!(
            "{name} must use http or https, got '{scheme}'"
        ))),
    }
}

/// Graphite (metrics source) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphiteConfig {
    /// Base URL, e.g. `https://graphite.example.com`
    pub url: String,
    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Start of the sample window, in Graphite's `from` syntax
    pub from: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            from: "-10minutes".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GraphiteConfig {
    /// Basic auth credentials, when both parts are set
    pub fn basic_auth(&self) -> Option<(String, String)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.to_string(), pass.to_string()))
            }
            _ => None,
        }
    }
}

/// Zenoss (event manager) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZenossConfig {
    /// Base URL, e.g. `https://zenoss.example.com`
    pub url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Device events are raised against
    pub device: String,
    /// Event class
    pub event_class: String,
    /// Event class key
    pub event_class_key: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ZenossConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            device: "Graphite".to_string(),
            event_class: "/Status".to_string(),
            event_class_key: "GraphiteZenossBridge".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Missing samples tolerated per window before a rule is indeterminate
    pub max_missing_samples: usize,
    /// Consecutive fetch failures before the fatal alert
    pub max_fetch_failures: u32,
    /// Alert state file
    pub state_file: PathBuf,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_missing_samples: DEFAULT_MAX_MISSING_SAMPLES,
            max_fetch_failures: 2,
            state_file: PathBuf::from("/tmp/failures.txt"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
