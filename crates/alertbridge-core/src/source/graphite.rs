//! Graphite render API client

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, trace};

use super::{FetchError, MetricsSource};
use crate::config::GraphiteConfig;
use crate::models::{Sample, SampleWindow};

/// Fetches raw series from Graphite's `/render/` endpoint
pub struct GraphiteSource {
    client: Client,
    base_url: String,
    from: String,
    credentials: Option<(String, String)>,
}

impl GraphiteSource {
    /// Create a new Graphite source
    pub fn new(config: &GraphiteConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("alertbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            from: config.from.clone(),
            credentials: config.basic_auth(),
        })
    }
}

#[async_trait]
impl MetricsSource for GraphiteSource {
    async fn fetch(&self, metrics: &[String]) -> Result<SampleWindow, FetchError> {
        let mut query = vec![("from", self.from.as_str()), ("rawData", "true")];
        let mut seen = HashSet::new();
        for metric in metrics {
            if seen.insert(metric.as_str()) {
                query.push(("target", metric.as_str()));
            }
        }

        let url = format!("{}/render/", self.base_url);
        debug!(url = %url, targets = seen.len(), "Querying Graphite");

        let mut request = self.client.get(&url).query(&query);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::HttpError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::HttpError(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_raw_response(&body)
    }
}

/// Parse Graphite's `rawData=true` format.
///
/// Each line is `<name>,<start>,<end>,<step>|<v1>,<v2>,...`. The series name
/// may itself contain commas (`sumSeries(a,b)`), so the three numeric fields
/// are taken from the right. A body with no usable series is an error.
pub fn parse_raw_response(body: &str) -> Result<SampleWindow, FetchError> {
    let series: Vec<(String, Vec<Sample>)> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(parse_line)
        .collect();

    if series.is_empty() {
        let preview: String = body.chars().take(120).collect();
        return Err(FetchError::Unparseable(format!(
            "no series found in response: {preview:?}"
        )));
    }

    trace!(series = series.len(), "Parsed Graphite response");
    Ok(series.into_iter().collect())
}

fn parse_line(line: &str) -> Option<(String, Vec<Sample>)> {
    let (header, values) = line.split_once('|')?;

    let mut fields = header.rsplitn(4, ',');
    let _step = fields.next()?;
    let _end = fields.next()?;
    let _start = fields.next()?;
    let name = fields.next().filter(|name| !name.is_empty())?;

    let values = values.trim_end();
    let samples = if values.is_empty() {
        Vec::new()
    } else {
        values.split(',').map(Sample::parse).collect()
    };

    Some((name.to_string(), samples))
}
