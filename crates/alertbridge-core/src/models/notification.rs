//! Event manager notification model

use serde::{Deserialize, Serialize};

use super::rule::{Rule, RuleKind};

/// Severity reserved for clear events
pub const SEVERITY_CLEAR: u8 = 0;

/// Severity used for alerts that never auto-clear (missing data, source down)
pub const SEVERITY_CRITICAL: u8 = 5;

/// Severity applied to rules that don't configure one
pub const DEFAULT_RULE_SEVERITY: u8 = 2;

/// Component name used for alerts about the bridge itself
pub const BRIDGE_COMPONENT: &str = "GraphiteZenossBridge";

const NO_AUTO_CLEAR: &str = "[This alert will not auto clear]";

/// A single event to deliver to the event manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Component the event is raised against (usually the rule title)
    pub component: String,

    /// Event summary
    pub message: String,

    /// Severity, 0 (clear) to 5 (critical)
    pub severity: u8,

    /// Device the event is raised against
    pub device: String,
}

impl Notification {
    /// Alert for a rule whose threshold was crossed
    pub fn alert(rule: &Rule, measured: f64, device: &str) -> Self {
        let direction = match rule.kind {
            RuleKind::Maximum => "over",
            RuleKind::Minimum => "under",
            RuleKind::RateOfChange => "outside",
        };

        Self {
            component: rule.title.clone(),
            message: format!(
                "{} is {} its threshold of {} at {} [ {} ]",
                rule.title, direction, rule.threshold, measured, rule.metric
            ),
            severity: rule.severity,
            device: device.to_string(),
        }
    }

    /// Clear for a rule that has recovered
    pub fn clear(rule: &Rule, device: &str) -> Self {
        Self {
            component: rule.title.clone(),
            message: format!("Clearing {}", rule.title),
            severity: SEVERITY_CLEAR,
            device: device.to_string(),
        }
    }

    /// Alert for a rule whose window has too many missing samples
    ///
    /// `missing == 0` means the source returned no samples at all for the
    /// metric.
    pub fn missing_data(rule: &Rule, missing: usize, device: &str) -> Self {
        let message = if missing == 0 {
            format!(
                "{} returned no data [ {} ] {}",
                rule.title, rule.metric, NO_AUTO_CLEAR
            )
        } else {
            format!(
                "{} is reporting too many 'None' values [ {} ] ({}) {}",
                rule.title, rule.metric, missing, NO_AUTO_CLEAR
            )
        };

        Self {
            component: rule.title.clone(),
            message,
            severity: SEVERITY_CRITICAL,
            device: device.to_string(),
        }
    }

    /// Alert that the metrics source keeps failing
    pub fn source_unreachable(attempts: u32, device: &str) -> Self {
        Self {
            component: BRIDGE_COMPONENT.to_string(),
            message: format!(
                "Requests to Graphite are failing ({} consecutive attempts)! {}",
                attempts, NO_AUTO_CLEAR
            ),
            severity: SEVERITY_CRITICAL,
            device: device.to_string(),
        }
    }

    /// Whether this event clears a previous alert
    pub fn is_clear(&self) -> bool {
        self.severity == SEVERITY_CLEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(kind: RuleKind) -> Rule {
        Rule::new("Queue depth", "stats.queue.depth", kind, 50.0, 3)
    }

    #[test]
    fn test_alert_carries_rule_severity() {
        let n = Notification::alert(&rule(RuleKind::Maximum), 72.0, "Graphite");

        assert_eq!(n.component, "Queue depth");
        assert_eq!(n.severity, 3);
        assert_eq!(
            n.message,
            "Queue depth is over its threshold of 50 at 72 [ stats.queue.depth ]"
        );
        assert!(!n.is_clear());
    }

    #[test]
    fn test_alert_direction_per_kind() {
        let min = Notification::alert(&rule(RuleKind::Minimum), 1.0, "Graphite");
        let roc = Notification::alert(&rule(RuleKind::RateOfChange), 60.0, "Graphite");

        assert!(min.message.contains("is under its threshold"));
        assert!(roc.message.contains("is outside its threshold"));
    }

    #[test]
    fn test_clear_uses_reserved_severity() {
        let n = Notification::clear(&rule(RuleKind::Minimum), "Graphite");
        assert_eq!(n.severity, SEVERITY_CLEAR);
        assert_eq!(n.message, "Clearing Queue depth");
        assert!(n.is_clear());
    }

    #[test]
    fn test_non_clearing_alerts_are_critical() {
        let missing = Notification::missing_data(&rule(RuleKind::Maximum), 6, "Graphite");
        let down = Notification::source_unreachable(2, "Graphite");

        assert_eq!(missing.severity, SEVERITY_CRITICAL);
        assert!(missing.message.contains("(6)"));
        assert!(missing.message.ends_with(NO_AUTO_CLEAR));
        assert_eq!(down.severity, SEVERITY_CRITICAL);
        assert_eq!(down.component, BRIDGE_COMPONENT);
    }

    #[test]
    fn test_empty_window_reports_no_data() {
        let n = Notification::missing_data(&rule(RuleKind::Minimum), 0, "Graphite");

        assert_eq!(
            n.message,
            format!("Queue depth returned no data [ stats.queue.depth ] {NO_AUTO_CLEAR}")
        );
        assert!(!n.message.contains("'None'"));
        assert_eq!(n.severity, SEVERITY_CRITICAL);
    }
}
