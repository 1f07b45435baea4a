//! # AlertBridge
//!
//! Threshold alerting from Graphite metrics to the Zenoss event manager.
//!
//! Each run fetches the recent samples of every configured metric, checks
//! them against maximum, minimum and rate-of-change thresholds, and raises
//! or clears events. Which rules were alerting is remembered in a small
//! state file so that a recovery produces exactly one clear event.
//!
//! ## Architecture
//!
//! - **Source**: batched fetch of raw series from Graphite's render API
//! - **Evaluator**: pure threshold checks producing a verdict per rule
//! - **State**: `key|timestamp` file of currently alerting rules
//! - **Notifier**: event delivery to Zenoss
//! - **Orchestrator**: load state, fetch, evaluate, notify, save state
//!
//! ## Quick Start
//!
//! ```bash
//! # Evaluate once (e.g. from cron)
//! alertbridge --config alertbridge.toml run
//!
//! # Evaluate every five minutes
//! alertbridge --config alertbridge.toml watch --interval 5m
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod error;
pub mod models;
pub mod source;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{
        AlertEvaluator, AlertState, FileStateRepository, Notifier, RunOrchestrator, RunOutcome,
        StateRepository,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::source::MetricsSource;
}
