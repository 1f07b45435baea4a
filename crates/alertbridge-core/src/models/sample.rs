//! Metric sample data models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single raw reading from the metrics source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Sample {
    /// A numeric reading
    Numeric(f64),
    /// The source had no value for this slot
    Missing,
}

impl Sample {
    /// Coerce a raw value from the wire.
    ///
    /// Anything that is not a finite number (`None`, empty strings, garbage,
    /// `nan`, `inf`) is treated as missing rather than rejected.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Numeric(value),
            _ => Self::Missing,
        }
    }

    /// The numeric value, if any
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Numeric(value) => Some(value),
            Self::Missing => None,
        }
    }

    /// Whether this slot carries no usable value
    pub fn is_missing(self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Numeric(value)
        } else {
            Self::Missing
        }
    }
}

impl From<Option<f64>> for Sample {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::from)
    }
}

/// Samples for every requested metric over one evaluation run.
///
/// Built in one go from the fetch response and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleWindow {
    series: HashMap<String, Vec<Sample>>,
}

impl SampleWindow {
    /// Create an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples for a metric, in source order. Unknown metrics yield an empty slice.
    pub fn samples(&self, metric: &str) -> &[Sample] {
        self.series.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the source returned a series for this metric
    pub fn contains(&self, metric: &str) -> bool {
        self.series.contains_key(metric)
    }

    /// Metric identifiers present in the window
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of series in the window
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the window holds no series at all
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<Sample>)> for SampleWindow {
    fn from_iter<I: IntoIterator<Item = (K, Vec<Sample>)>>(iter: I) -> Self {
        Self {
            series: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("42", Sample::Numeric(42.0))]
    #[case(" 3.5\n", Sample::Numeric(3.5))]
    #[case("-1e3", Sample::Numeric(-1000.0))]
    #[case("None", Sample::Missing)]
    #[case("None\n", Sample::Missing)]
    #[case("", Sample::Missing)]
    #[case("abc", Sample::Missing)]
    #[case("nan", Sample::Missing)]
    #[case("inf", Sample::Missing)]
    fn test_parse_coerces_non_numeric_to_missing(#[case] raw: &str, #[case] expected: Sample) {
        assert_eq!(Sample::parse(raw), expected);
    }

    #[test]
    fn test_window_unknown_metric_is_empty() {
        let window: SampleWindow = [("a.b", vec![Sample::Numeric(1.0)])].into_iter().collect();

        assert!(window.contains("a.b"));
        assert!(!window.contains("c.d"));
        assert!(window.samples("c.d").is_empty());
        assert_eq!(window.samples("a.b"), &[Sample::Numeric(1.0)]);
    }
}
