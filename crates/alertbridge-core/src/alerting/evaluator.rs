//! Threshold evaluation engine
//!
//! Turns a rule and its metric's samples into a [`Verdict`]. Evaluation is a
//! pure computation: the same rule and samples always give the same verdict.

use tracing::trace;

use crate::models::{Rule, RuleKind, Sample, Verdict};

/// Missing samples tolerated in a window before a rule is indeterminate
pub const DEFAULT_MAX_MISSING_SAMPLES: usize = 4;

/// Extremes and missing count for one window
#[derive(Debug, Clone, Copy)]
struct WindowStats {
    max: f64,
    min: f64,
    numeric: usize,
    missing: usize,
}

impl WindowStats {
    fn collect(samples: &[Sample]) -> Self {
        let initial = Self {
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            numeric: 0,
            missing: 0,
        };

        samples.iter().fold(initial, |mut stats, sample| {
            match sample.value() {
                Some(value) => {
                    stats.max = stats.max.max(value);
                    stats.min = stats.min.min(value);
                    stats.numeric += 1;
                }
                None => stats.missing += 1,
            }
            stats
        })
    }
}

/// Evaluates threshold rules against sample windows
#[derive(Debug, Clone, Copy)]
pub struct AlertEvaluator {
    max_missing: usize,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MISSING_SAMPLES)
    }
}

impl AlertEvaluator {
    /// Create an evaluator tolerating up to `max_missing` missing samples per window
    pub fn new(max_missing: usize) -> Self {
        Self { max_missing }
    }

    /// Missing-sample tolerance
    pub fn max_missing(&self) -> usize {
        self.max_missing
    }

    /// Evaluate a single rule against its metric's samples.
    ///
    /// The missing-data check runs before any threshold comparison, for every
    /// rule kind. A window with no numeric samples at all is always
    /// indeterminate and reports the whole window as missing.
    pub fn evaluate(&self, rule: &Rule, samples: &[Sample]) -> Verdict {
        let stats = WindowStats::collect(samples);

        if stats.numeric == 0 {
            return Verdict::Indeterminate {
                missing: samples.len(),
            };
        }

        if stats.missing > self.max_missing {
            return Verdict::Indeterminate {
                missing: stats.missing,
            };
        }

        let (measured, violated) = match rule.kind {
            RuleKind::Maximum => (stats.max, stats.max > rule.threshold),
            RuleKind::Minimum => (stats.min, stats.min < rule.threshold),
            RuleKind::RateOfChange => {
                let spread = stats.max - stats.min;
                (spread, spread > rule.threshold)
            }
        };

        trace!(
            rule = %rule.title,
            kind = %rule.kind,
            measured,
            threshold = rule.threshold,
            missing = stats.missing,
            violated,
            "Evaluated rule"
        );

        if violated {
            Verdict::Violated {
                measured,
                threshold: rule.threshold,
            }
        } else {
            Verdict::Clear { measured }
        }
    }
}
