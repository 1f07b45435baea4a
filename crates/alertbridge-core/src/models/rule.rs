//! Threshold rule data models

use std::fmt;

use serde::{Deserialize, Serialize};

use super::notification::DEFAULT_RULE_SEVERITY;

/// How a rule compares its metric against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Alert when the largest sample exceeds the threshold
    Maximum,
    /// Alert when the smallest sample falls below the threshold
    Minimum,
    /// Alert when the spread between largest and smallest sample exceeds the threshold
    RateOfChange,
}

impl RuleKind {
    /// Suffix appended to the rule title to form its state key
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Maximum => "max",
            Self::Minimum => "min",
            Self::RateOfChange => "roc",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.suffix())
    }
}

/// A single threshold check bound to one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Human-readable name, unique within a run
    pub title: String,

    /// Metric identifier (e.g. `stats.web.requests`)
    pub metric: String,

    /// Comparison kind
    pub kind: RuleKind,

    /// Bound the comparison is made against
    pub threshold: f64,

    /// Severity passed through to the event manager
    pub severity: u8,
}

impl Rule {
    /// Create a new rule
    pub fn new(
        title: impl Into<String>,
        metric: impl Into<String>,
        kind: RuleKind,
        threshold: f64,
        severity: u8,
    ) -> Self {
        Self {
            title: title.into(),
            metric: metric.into(),
            kind,
            threshold,
            severity,
        }
    }

    /// Key under which this rule's alert state is persisted
    pub fn state_key(&self) -> String {
        format!("{}-{}", self.title, self.kind.suffix())
    }
}

/// A rule entry as written in configuration.
///
/// One entry can carry any combination of `max`, `min` and `roc` bounds for
/// the same metric; each configured bound becomes its own [`Rule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Human-readable name
    pub title: String,

    /// Metric identifier
    pub metric: String,

    /// Upper bound
    #[serde(default)]
    pub max: Option<f64>,

    /// Lower bound
    #[serde(default)]
    pub min: Option<f64>,

    /// Maximum allowed spread across the window
    #[serde(default)]
    pub roc: Option<f64>,

    /// Severity for alerts raised by this entry
    #[serde(default = "default_severity")]
    pub severity: u8,
}

fn default_severity() -> u8 {
    DEFAULT_RULE_SEVERITY
}

impl RuleConfig {
    /// Expand into concrete rules, in max, min, roc order.
    /// An entry without any bound yields nothing.
    pub fn rules(&self) -> Vec<Rule> {
        [
            (RuleKind::Maximum, self.max),
            (RuleKind::Minimum, self.min),
            (RuleKind::RateOfChange, self.roc),
        ]
        .into_iter()
        .filter_map(|(kind, threshold)| {
            threshold.map(|t| Rule::new(&self.title, &self.metric, kind, t, self.severity))
        })
        .collect()
    }

    /// Whether at least one bound is configured
    pub fn has_threshold(&self) -> bool {
        self.max.is_some() || self.min.is_some() || self.roc.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(max: Option<f64>, min: Option<f64>, roc: Option<f64>) -> RuleConfig {
        RuleConfig {
            title: "Web requests".to_string(),
            metric: "stats.web.requests".to_string(),
            max,
            min,
            roc,
            severity: 3,
        }
    }

    #[test]
    fn test_state_key_includes_kind_suffix() {
        let rule = Rule::new("X", "a.b", RuleKind::Maximum, 10.0, 2);
        assert_eq!(rule.state_key(), "X-max");

        let rule = Rule::new("X", "a.b", RuleKind::Minimum, 10.0, 2);
        assert_eq!(rule.state_key(), "X-min");

        let rule = Rule::new("X", "a.b", RuleKind::RateOfChange, 10.0, 2);
        assert_eq!(rule.state_key(), "X-roc");
    }

    #[test]
    fn test_expand_all_bounds_in_order() {
        let rules = entry(Some(100.0), Some(5.0), Some(20.0)).rules();

        let kinds: Vec<RuleKind> = rules.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RuleKind::Maximum, RuleKind::Minimum, RuleKind::RateOfChange]
        );
        assert!(rules.iter().all(|r| r.severity == 3));
        assert_eq!(rules[1].threshold, 5.0);
    }

    #[test]
    fn test_entry_without_threshold_yields_no_rules() {
        let config = entry(None, None, None);
        assert!(!config.has_threshold());
        assert!(config.rules().is_empty());
    }

    #[test]
    fn test_zero_bound_is_a_real_threshold() {
        let rules = entry(None, Some(0.0), None).rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].kind, RuleKind::Minimum);
    }

    #[test]
    fn test_severity_defaults_when_omitted() {
        let config: RuleConfig =
            serde_json::from_str(r#"{"title":"T","metric":"m","max":1.0}"#).unwrap();
        assert_eq!(config.severity, DEFAULT_RULE_SEVERITY);
    }
}
