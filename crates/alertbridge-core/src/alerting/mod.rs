//! Alerting system for AlertBridge
//!
//! Provides threshold evaluation, cross-run alert state, notification
//! delivery and run orchestration.

mod evaluator;
mod notifier;
mod orchestrator;
mod repository;

pub use evaluator::{AlertEvaluator, DEFAULT_MAX_MISSING_SAMPLES};
pub use notifier::{LogNotifier, NotificationError, Notifier, ZenossNotifier};
pub use orchestrator::{
    RuleOutcome, RunOrchestrator, RunOutcome, RunReport, DEFAULT_MAX_FETCH_FAILURES,
};
pub use repository::{
    format_timestamp, AlertState, FileStateRepository, MemoryStateRepository, StateRepository,
    TIMESTAMP_FORMAT,
};
