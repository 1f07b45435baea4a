//! Metrics source boundary
//!
//! A source answers one batched request per run with the recent samples of
//! every requested metric.

mod graphite;

pub use graphite::{parse_raw_response, GraphiteSource};

use async_trait::async_trait;

use crate::models::SampleWindow;

/// Something that can fetch sample windows for a set of metrics
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch the current window for every metric in `metrics`, in one request
    async fn fetch(&self, metrics: &[String]) -> Result<SampleWindow, FetchError>;
}

/// Metrics fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure: connection refused, DNS, TLS or timeout
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The source answered with a non-success status
    #[error("Source returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for the log
        body: String,
    },

    /// The response body couldn't be read as series
    #[error("Unparseable response: {0}")]
    Unparseable(String),

    /// The source couldn't be built from its configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
