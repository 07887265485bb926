//! gateflow CLI entry point.
//!
//! Loads the configuration, initializes logging and drives the orchestrator.

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use gateflow::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Scheduled, quality-gated data pipeline runner.
#[derive(Parser, Debug)]
#[command(name = "gateflow", version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "GATEFLOW_CONFIG", default_value = "gateflow.json")]
    config: PathBuf,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every period that is due, oldest first, then exit.
    Run,
    /// Tick on the configured interval until interrupted.
    Serve,
    /// Re-run a failed period.
    Rerun {
        /// Period date, YYYY-MM-DD.
        date: NaiveDate,
    },
    /// Print the ledger and pending periods as JSON.
    Status,
}

fn init_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }
}

fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current node");
            cancel.cancel("interrupted");
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = OrchestratorConfig::from_json_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let orchestrator = Orchestrator::from_config(&config, Arc::new(LoggingEventSink::default()))
        .context("building orchestrator")?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    match cli.command {
        Command::Run => {
            let records = orchestrator.run_due(Utc::now(), &cancel).await?;
            let failed = records.iter().filter(|r| !r.is_success()).count();
            info!(runs = records.len(), failed, "Run finished");
            if failed > 0 {
                bail!("{failed} run(s) failed");
            }
            if let Some((period, deferral)) = orchestrator.blocked(Utc::now()) {
                bail!("backfill blocked at {period}: {deferral}");
            }
        }
        Command::Serve => orchestrator.serve(&cancel).await?,
        Command::Rerun { date } => {
            let period = orchestrator
                .scheduler()
                .cadence()
                .due_until(Utc::now())
                .into_iter()
                .find(|period| period.date() == date)
                .with_context(|| format!("no scheduled period on {date}"))?;
            let record = orchestrator.rerun(period, &cancel).await?;
            if !record.is_success() {
                bail!(
                    "re-run of {period} failed at {}: {}",
                    record.failed_node().unwrap_or("?"),
                    record.failure_reason().unwrap_or("unknown")
                );
            }
            info!(%period, "Re-run succeeded");
        }
        Command::Status => {
            let status = orchestrator.status(Utc::now());
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
