//! Run orchestration
//!
//! One run loads the previous alert state, fetches every referenced metric in
//! a single request, evaluates rules in configured order, notifies, and
//! writes the new state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{Notification, Rule, SampleWindow, Verdict};
use crate::source::MetricsSource;

use super::evaluator::AlertEvaluator;
use super::notifier::Notifier;
use super::repository::{format_timestamp, AlertState, StateRepository};

/// Default number of consecutive fetch failures before escalating
pub const DEFAULT_MAX_FETCH_FAILURES: u32 = 2;

/// What happened to a single rule during a run
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    /// State key of the rule
    pub key: String,
    /// Metric evaluated
    pub metric: String,
    /// Evaluation result
    pub verdict: Verdict,
    /// Notification emitted, if any
    pub notification: Option<Notification>,
    /// Whether the notification was delivered
    pub delivered: bool,
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Per-rule outcomes, in evaluation order
    pub outcomes: Vec<RuleOutcome>,
    /// Notifications delivered
    pub notifications_sent: usize,
    /// Notifications that could not be delivered
    pub notifications_failed: usize,
    /// Entries in the newly saved alert state
    pub alerting: usize,
}

/// Result of a single run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Rules were evaluated and state saved
    Completed(RunReport),
    /// The metrics fetch failed; nothing was evaluated or saved
    Skipped {
        /// Consecutive failures so far, including this one
        consecutive_failures: u32,
        /// Why the fetch failed
        reason: String,
    },
}

/// Drives evaluation runs against a metrics source
pub struct RunOrchestrator {
    rules: Vec<Rule>,
    source: Arc<dyn MetricsSource>,
    notifier: Arc<dyn Notifier>,
    state: Arc<dyn StateRepository>,
    evaluator: AlertEvaluator,
    device: String,
    max_fetch_failures: u32,
    fetch_failures: u32,
}

impl RunOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        rules: Vec<Rule>,
        source: Arc<dyn MetricsSource>,
        notifier: Arc<dyn Notifier>,
        state: Arc<dyn StateRepository>,
    ) -> Self {
        Self {
            rules,
            source,
            notifier,
            state,
            evaluator: AlertEvaluator::default(),
            device: "Graphite".to_string(),
            max_fetch_failures: DEFAULT_MAX_FETCH_FAILURES,
            fetch_failures: 0,
        }
    }

    /// Use a specific evaluator
    pub fn with_evaluator(mut self, evaluator: AlertEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Device name events are raised against
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Consecutive fetch failures tolerated before the fatal alert (minimum 1)
    pub fn with_max_fetch_failures(mut self, max: u32) -> Self {
        self.max_fetch_failures = max.max(1);
        self
    }

    /// Rules evaluated each run
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Consecutive fetch failures as of the last run
    pub fn fetch_failures(&self) -> u32 {
        self.fetch_failures
    }

    /// Distinct metrics referenced by the rules, in first-use order
    fn metrics(&self) -> Vec<String> {
        let mut metrics: Vec<String> = Vec::new();
        for rule in &self.rules {
            if !metrics.contains(&rule.metric) {
                metrics.push(rule.metric.clone());
            }
        }
        metrics
    }

    /// Run once, stamping new alerts with the current time
    pub async fn run_once(&mut self) -> Result<RunOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Run once, stamping new alerts with `now`.
    ///
    /// Returns [`Error::SourceUnreachable`] once the fetch has failed
    /// `max_fetch_failures` times in a row, after sending the fatal alert.
    /// The failure count is kept in the state repository, so it carries
    /// across separate invocations as well as across runs of one process.
    pub async fn run_at(&mut self, now: DateTime<Utc>) -> Result<RunOutcome> {
        let prior = self.state.load().await;
        self.fetch_failures = self.state.load_fetch_failures().await;
        debug!(
            entries = prior.len(),
            fetch_failures = self.fetch_failures,
            "Loaded previous alert state"
        );

        let window = match self.fetch().await {
            Ok(window) => window,
            Err(Error::Fetch(e)) => {
                self.fetch_failures += 1;

                if self.fetch_failures >= self.max_fetch_failures {
                    let attempts = self.fetch_failures;
                    error!(
                        attempts,
                        error = %e,
                        "Metrics source unreachable, giving up"
                    );
                    let notification = Notification::source_unreachable(attempts, &self.device);
                    self.deliver(&notification).await;

                    // Start counting afresh so the next invocation doesn't re-escalate at once
                    self.fetch_failures = 0;
                    if let Err(e) = self.state.save_fetch_failures(0).await {
                        error!(error = %e, "Failed to reset fetch failure count");
                    }
                    return Err(Error::SourceUnreachable { attempts });
                }

                self.state.save_fetch_failures(self.fetch_failures).await?;

                warn!(
                    attempts = self.fetch_failures,
                    max = self.max_fetch_failures,
                    error = %e,
                    "Metrics fetch failed, skipping this run"
                );
                return Ok(RunOutcome::Skipped {
                    consecutive_failures: self.fetch_failures,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        if self.fetch_failures > 0 {
            self.fetch_failures = 0;
            self.state.save_fetch_failures(0).await?;
        }

        let Evaluation { staged, mut report } = self
            .evaluate_all(&prior, &window, &format_timestamp(now))
            .await;

        self.state.save(&staged).await?;
        report.alerting = staged.len();

        info!(
            rules = report.outcomes.len(),
            sent = report.notifications_sent,
            failed = report.notifications_failed,
            alerting = report.alerting,
            "Run complete"
        );

        Ok(RunOutcome::Completed(report))
    }

    /// Run every `every` until the source becomes unreachable, the state
    /// can't be saved, or Ctrl+C is received.
    pub async fn watch(&mut self, every: Duration) -> Result<()> {
        if every.is_zero() {
            return Err(Error::config("watch interval must be greater than zero"));
        }

        info!(interval = ?every, rules = self.rules.len(), "Starting watch loop");

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn fetch(&self) -> Result<SampleWindow> {
        if self.rules.is_empty() {
            return Ok(SampleWindow::new());
        }

        let metrics = self.metrics();
        debug!(count = metrics.len(), "Fetching metrics");

        Ok(self.source.fetch(&metrics).await?)
    }

    /// Apply the alert state machine to every rule
    async fn evaluate_all(
        &self,
        prior: &AlertState,
        window: &SampleWindow,
        now: &str,
    ) -> Evaluation {
        let mut staged = AlertState::new();
        let mut report = RunReport::default();

        for rule in &self.rules {
            let key = rule.state_key();
            let verdict = self.evaluator.evaluate(rule, window.samples(&rule.metric));
            let since = prior.since(&key);

            let notification = match verdict {
                Verdict::Violated { measured, threshold } => {
                    // Re-alerts keep the time of the first violation
                    staged.record_alert(key.as_str(), since.unwrap_or(now));
                    info!(
                        rule = %rule.title,
                        metric = %rule.metric,
                        kind = %rule.kind,
                        measured,
                        threshold,
                        since = since.unwrap_or(now),
                        "Threshold violated"
                    );
                    Some(Notification::alert(rule, measured, &self.device))
                }
                Verdict::Clear { measured } => {
                    if since.is_some() {
                        info!(rule = %rule.title, kind = %rule.kind, measured, "Recovered, clearing");
                        Some(Notification::clear(rule, &self.device))
                    } else {
                        info!(
                            rule = %rule.title,
                            kind = %rule.kind,
                            measured,
                            "OK and hasn't been down previously"
                        );
                        None
                    }
                }
                Verdict::Indeterminate { missing } => {
                    // Not part of alert tracking; an existing alert stays recorded
                    if let Some(since) = since {
                        staged.record_alert(key.as_str(), since);
                    }
                    warn!(
                        rule = %rule.title,
                        metric = %rule.metric,
                        missing,
                        "Too many missing values"
                    );
                    Some(Notification::missing_data(rule, missing, &self.device))
                }
            };

            let delivered = match &notification {
                Some(notification) => self.deliver(notification).await,
                None => false,
            };

            if let Some(notification) = &notification {
                if delivered {
                    report.notifications_sent += 1;
                } else {
                    report.notifications_failed += 1;
                    // Keep the alert so the clear is retried next run
                    if let (true, Some(since)) = (notification.is_clear(), since) {
                        staged.record_alert(key.as_str(), since);
                    }
                }
            }

            report.outcomes.push(RuleOutcome {
                key,
                metric: rule.metric.clone(),
                verdict,
                notification,
                delivered,
            });
        }

        Evaluation { staged, report }
    }

    /// Best-effort delivery; failures are logged and reported, never fatal
    async fn deliver(&self, notification: &Notification) -> bool {
        match self.notifier.send(notification).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    component = %notification.component,
                    severity = notification.severity,
                    error = %e,
                    "Failed to deliver notification"
                );
                false
            }
        }
    }
}

struct Evaluation {
    staged: AlertState,
    report: RunReport,
}
