//! Per-rule evaluation outcome

use serde::{Deserialize, Serialize};

/// Outcome of evaluating one rule against its samples for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// The measured value crossed the threshold
    Violated {
        /// Maximum, minimum or spread, depending on the rule kind
        measured: f64,
        /// The bound that was crossed
        threshold: f64,
    },
    /// The measured value is within bounds
    Clear {
        /// Maximum, minimum or spread, depending on the rule kind
        measured: f64,
    },
    /// Too much of the window is missing to trust a comparison
    Indeterminate {
        /// Number of missing samples in the window
        missing: usize,
    },
}

impl Verdict {
    /// Whether the rule is currently violated
    pub fn is_violated(&self) -> bool {
        matches!(self, Self::Violated { .. })
    }

    /// Whether the rule is within bounds
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear { .. })
    }

    /// Whether the rule could not be evaluated
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate { .. })
    }
}
