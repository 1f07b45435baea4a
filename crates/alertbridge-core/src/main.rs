//! AlertBridge CLI
//!
//! Command-line interface for the Graphite to Zenoss alerting bridge.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use alertbridge::alerting::{
    AlertEvaluator, FileStateRepository, LogNotifier, MemoryStateRepository, Notifier,
    RunOrchestrator, RunOutcome, StateRepository, ZenossNotifier,
};
use alertbridge::config::{Config, LogFormat};
use alertbridge::models::Verdict;
use alertbridge::source::GraphiteSource;
use alertbridge::Error;
use clap::{Parser, Subcommand};
use tracing::{error, info};

/// AlertBridge - Graphite thresholds to Zenoss events
#[derive(Parser)]
#[command(name = "alertbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "ALERTBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate all rules once
    Run {
        /// Log notifications instead of sending them, and leave the state file untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Evaluate all rules periodically until interrupted
    Watch {
        /// Time between runs (e.g. "30s", "5m")
        #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
        interval: Duration,

        /// Log notifications instead of sending them, and leave the state file untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and list the rules it defines
    CheckConfig,

    /// Show the persisted alert state
    State,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Run { dry_run } => run_once(&config, dry_run, cli.format).await,
        Commands::Watch { interval, dry_run } => run_watch(&config, interval, dry_run).await,
        Commands::CheckConfig => check_config(&config, cli.format),
        Commands::State => show_state(&config, cli.format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn build_orchestrator(config: &Config, dry_run: bool) -> anyhow::Result<RunOrchestrator> {
    let source = Arc::new(GraphiteSource::new(&config.graphite)?);
    let file_state = FileStateRepository::new(&config.evaluation.state_file);

    let (notifier, state): (Arc<dyn Notifier>, Arc<dyn StateRepository>) = if dry_run {
        info!("Dry run: notifications are logged and state is not saved");
        let seeded = MemoryStateRepository::new(file_state.load().await)
            .with_fetch_failures(file_state.load_fetch_failures().await);
        (Arc::new(LogNotifier), Arc::new(seeded))
    } else {
        (
            Arc::new(ZenossNotifier::new(&config.zenoss)?),
            Arc::new(file_state),
        )
    };

    Ok(RunOrchestrator::new(config.rules(), source, notifier, state)
        .with_evaluator(AlertEvaluator::new(config.evaluation.max_missing_samples))
        .with_device(&config.zenoss.device)
        .with_max_fetch_failures(config.evaluation.max_fetch_failures))
}

async fn run_once(config: &Config, dry_run: bool, format: OutputFormat) -> anyhow::Result<()> {
    let mut orchestrator = build_orchestrator(config, dry_run).await?;

    let outcome = match orchestrator.run_once().await {
        Ok(outcome) => outcome,
        Err(e @ Error::SourceUnreachable { .. }) => return Err(e.into()),
        Err(e) => return Err(anyhow::Error::new(e).context("evaluation run failed")),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print_outcome(&outcome),
    }

    Ok(())
}

async fn run_watch(config: &Config, interval: Duration, dry_run: bool) -> anyhow::Result<()> {
    let mut orchestrator = build_orchestrator(config, dry_run).await?;
    orchestrator.watch(interval).await?;
    Ok(())
}

fn check_config(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let rules = config.rules();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rules)?),
        OutputFormat::Text => {
            println!("Configuration OK: {} rule(s)", rules.len());
            for rule in &rules {
                println!(
                    "  {:<32} {:<4} {:>12}  severity {}  [ {} ]",
                    rule.state_key(),
                    rule.kind,
                    rule.threshold,
                    rule.severity,
                    rule.metric
                );
            }
        }
    }

    Ok(())
}

async fn show_state(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let state = FileStateRepository::new(&config.evaluation.state_file)
        .load()
        .await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Text => {
            if state.is_empty() {
                println!("No rules are alerting");
            }
            for (key, since) in state.iter() {
                println!("{key:<40} alerting since {since}");
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Skipped {
            consecutive_failures,
            reason,
        } => {
            println!("Skipped: metrics fetch failed ({consecutive_failures} in a row): {reason}");
        }
        RunOutcome::Completed(report) => {
            for rule in &report.outcomes {
                let verdict = match rule.verdict {
                    Verdict::Violated { measured, threshold } => {
                        format!("VIOLATED {measured} (threshold {threshold})")
                    }
                    Verdict::Clear { measured } => format!("ok {measured}"),
                    Verdict::Indeterminate { missing } => format!("UNKNOWN ({missing} missing)"),
                };
                let delivery = match (&rule.notification, rule.delivered) {
                    (None, _) => "",
                    (Some(_), true) => " -> notified",
                    (Some(_), false) => " -> notification FAILED",
                };
                println!("{:<40} {verdict}{delivery}", rule.key);
            }
            println!(
                "{} rule(s), {} notification(s) sent, {} failed, {} alerting",
                report.outcomes.len(),
                report.notifications_sent,
                report.notifications_failed,
                report.alerting
            );
        }
    }
}
