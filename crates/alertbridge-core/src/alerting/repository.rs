//! Alert state persistence
//!
//! The state records which rules were alerting as of the last run, keyed by
//! [`Rule::state_key`](crate::models::Rule::state_key), with the time of the
//! first observed violation. It is read once at the start of a run and
//! rewritten in full at the end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Separator between key and timestamp in the state file
const SEPARATOR: char = '|';

/// Timestamp format written for new alerts
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the way it is persisted
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Mapping from rule state key to first-violation timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AlertState {
    entries: BTreeMap<String, String>,
}

impl AlertState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` has a recorded, non-empty alert timestamp
    pub fn was_alerting(&self, key: &str) -> bool {
        self.since(key).is_some()
    }

    /// Timestamp of the first violation for `key`, if alerting
    pub fn since(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|ts| !ts.is_empty())
    }

    /// Stage an alert. Timestamps are stored verbatim.
    pub fn record_alert(&mut self, key: impl Into<String>, timestamp: impl Into<String>) {
        self.entries.insert(key.into(), timestamp.into());
    }

    /// Iterate over `(key, timestamp)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no alerts are recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the line-oriented `key|timestamp` format.
    ///
    /// Malformed lines are skipped. The last record for a key wins.
    pub fn parse(contents: &str) -> Self {
        let mut state = Self::new();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            match line.rsplit_once(SEPARATOR) {
                Some((key, timestamp)) if !key.is_empty() => {
                    state.record_alert(key, timestamp.trim());
                }
                _ => {
                    warn!(line = index + 1, content = line, "Skipping malformed state record");
                }
            }
        }

        state
    }

    /// Render in the line-oriented `key|timestamp` format
    pub fn render(&self) -> String {
        self.iter()
            .map(|(key, timestamp)| format!("{key}{SEPARATOR}{timestamp}\n"))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AlertState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Storage for cross-run alert state
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Load the state written by the previous run.
    ///
    /// A missing or unreadable store means there is no history and yields an
    /// empty state.
    async fn load(&self) -> AlertState;

    /// Replace the stored state with exactly `state`
    async fn save(&self, state: &AlertState) -> Result<()>;

    /// Consecutive failed metrics fetches recorded by earlier runs.
    ///
    /// Missing or unreadable counts are treated as zero.
    async fn load_fetch_failures(&self) -> u32;

    /// Record the consecutive failed fetch count for the next run
    async fn save_fetch_failures(&self, count: u32) -> Result<()>;
}

/// State repository backed by a plain text file
#[derive(Debug, Clone)]
pub struct FileStateRepository {
    path: PathBuf,
}

impl FileStateRepository {
    /// Create a repository for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file holding the consecutive fetch failure count
    pub fn failures_path(&self) -> PathBuf {
        self.sibling(".fetch-failures")
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateRepository for FileStateRepository {
    async fn load(&self) -> AlertState {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let state = AlertState::parse(&contents);
                debug!(path = %self.path.display(), entries = state.len(), "Loaded alert state");
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No alert state found, starting fresh");
                AlertState::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Alert state unreadable, starting fresh");
                AlertState::new()
            }
        }
    }

    async fn save(&self, state: &AlertState) -> Result<()> {
        let temp = self.temp_path();

        tokio::fs::write(&temp, state.render()).await.map_err(|e| {
            Error::state_store(format!("failed to write {}: {e}", temp.display()))
        })?;

        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "failed to replace {}: {e}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), entries = state.len(), "Saved alert state");
        Ok(())
    }

    async fn load_fetch_failures(&self) -> u32 {
        let path = self.failures_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents.trim().parse().unwrap_or_else(|_| {
                warn!(path = %path.display(), "Fetch failure count unreadable, assuming 0");
                0
            }),
            Err(_) => 0,
        }
    }

    async fn save_fetch_failures(&self, count: u32) -> Result<()> {
        let path = self.failures_path();

        let result = if count == 0 {
            match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        } else {
            tokio::fs::write(&path, format!("{count}\n")).await
        };

        result.map_err(|e| Error::state_store(format!("failed to update {}: {e}", path.display())))
    }
}

/// State repository kept in memory, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStateRepository {
    state: RwLock<AlertState>,
    fetch_failures: RwLock<u32>,
}

impl MemoryStateRepository {
    /// Create a repository seeded with `state`
    pub fn new(state: AlertState) -> Self {
        Self {
            state: RwLock::new(state),
            fetch_failures: RwLock::new(0),
        }
    }

    /// Seed the consecutive fetch failure count
    pub fn with_fetch_failures(self, count: u32) -> Self {
        Self {
            fetch_failures: RwLock::new(count),
            ..self
        }
    }

    /// Current contents
    pub async fn snapshot(&self) -> AlertState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl StateRepository for MemoryStateRepository {
    async fn load(&self) -> AlertState {
        self.snapshot().await
    }

    async fn save(&self, state: &AlertState) -> Result<()> {
        *self.state.write().await = state.clone();
        Ok(())
    }

    async fn load_fetch_failures(&self) -> u32 {
        *self.fetch_failures.read().await
    }

    async fn save_fetch_failures(&self, count: u32) -> Result<()> {
        *self.fetch_failures.write().await = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_malformed_lines() {
        let state = AlertState::parse(
            "Web-max|2024-01-02 03:04:05\nno separator here\n|2024-01-01 00:00:00\n\nDisk-min|2024-02-02 00:00:00\r\n",
        );

        assert_eq!(state.len(), 2);
        assert_eq!(state.since("Web-max"), Some("2024-01-02 03:04:05"));
        assert_eq!(state.since("Disk-min"), Some("2024-02-02 00:00:00"));
    }

    #[test]
    fn test_parse_keeps_separator_in_title() {
        let state = AlertState::parse("a|b-max|2024-01-02 03:04:05\n");
        assert_eq!(state.since("a|b-max"), Some("2024-01-02 03:04:05"));
    }

    #[test]
    fn test_empty_timestamp_is_not_alerting() {
        let state = AlertState::parse("Web-max|\n");
        assert!(!state.was_alerting("Web-max"));
        assert!(!state.was_alerting("Other-max"));
    }

    #[test]
    fn test_last_record_wins() {
        let state = AlertState::parse("X-max|first\nX-max|second\n");
        assert_eq!(state.since("X-max"), Some("second"));
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-09 07:05:01");
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let repo = FileStateRepository::new(dir.path().join("failures.txt"));

        assert!(repo.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        // A directory can't be read as a file
        let repo = FileStateRepository::new(dir.path());

        assert!(repo.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let repo = FileStateRepository::new(dir.path().join("failures.txt"));

        repo.save(&AlertState::new()).await.unwrap();
        assert!(repo.load().await.is_empty());

        let state: AlertState = [("X-max", "2024-01-02 03:04:05")].into_iter().collect();
        repo.save(&state).await.unwrap();
        assert_eq!(repo.load().await, state);

        let contents = std::fs::read_to_string(repo.path()).unwrap();
        assert_eq!(contents, "X-max|2024-01-02 03:04:05\n");
        assert!(!dir.path().join("failures.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_state() {
        let dir = TempDir::new().unwrap();
        let repo = FileStateRepository::new(dir.path().join("failures.txt"));

        let first: AlertState = [("A-max", "t1"), ("B-min", "t2")].into_iter().collect();
        repo.save(&first).await.unwrap();

        let second: AlertState = [("B-min", "t2")].into_iter().collect();
        repo.save(&second).await.unwrap();

        assert_eq!(repo.load().await, second);
    }

    #[tokio::test]
    async fn test_fetch_failures_persist_in_sidecar_file() {
        let dir = TempDir::new().unwrap();
        let repo = FileStateRepository::new(dir.path().join("failures.txt"));

        assert_eq!(repo.load_fetch_failures().await, 0);

        repo.save_fetch_failures(3).await.unwrap();
        assert_eq!(
            FileStateRepository::new(dir.path().join("failures.txt"))
                .load_fetch_failures()
                .await,
            3
        );
        assert!(dir.path().join("failures.txt.fetch-failures").exists());
        assert!(!repo.path().exists());

        repo.save_fetch_failures(0).await.unwrap();
        assert_eq!(repo.load_fetch_failures().await, 0);
        assert!(!repo.failures_path().exists());

        // Clearing an absent count is fine
        repo.save_fetch_failures(0).await.unwrap();
    }

    #[tokio::test]
    async fn test_garbled_fetch_failures_read_as_zero() {
        let dir = TempDir::new().unwrap();
        let repo = FileStateRepository::new(dir.path().join("failures.txt"));
        std::fs::write(repo.failures_path(), "lots").unwrap();

        assert_eq!(repo.load_fetch_failures().await, 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let repo = FileStateRepository::new(dir.path().join("missing").join("failures.txt"));

        let err = repo.save(&AlertState::new()).await.unwrap_err();
        assert!(matches!(err, Error::StateStore(_)));
    }
}
