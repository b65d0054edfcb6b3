//! Trading desk CLI
//!
//! # Usage
//!
//! ```bash
//! # Full run with the default plan
//! trading-desk run --ticker NVDA --date 2024-05-10
//!
//! # Two analysts, JSON output including the final snapshot
//! trading-desk run --ticker NVDA --analysts market,news --json --snapshot
//!
//! # Show the resolved plan for a config file
//! DESK_MAX_DEBATE_ROUNDS=2 trading-desk plan --config desk.toml
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stage_engine::config::parse_list;
use stage_engine::{PipelinePlan, RunConfig, RunTracer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trading_desk::{build_orchestrator, RunSummary};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline for one ticker and date
    Run {
        #[arg(long)]
        ticker: String,

        /// Trade date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,

        #[command(flatten)]
        source: ConfigSource,

        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Include the final state snapshot in JSON output
        #[arg(long, default_value_t = false, requires = "json")]
        snapshot: bool,
    },

    /// Print the resolved plan without running it
    Plan {
        #[command(flatten)]
        source: ConfigSource,
    },
}

#[derive(clap::Args, Debug)]
struct ConfigSource {
    /// TOML run configuration (DESK_* variables still apply)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated analyst kinds, overriding the config
    #[arg(long)]
    analysts: Option<String>,
}

impl ConfigSource {
    fn load(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => RunConfig::from_env(),
        };
        if let Some(list) = &self.analysts {
            config.analysts = parse_list(list);
        }
        config.validate().context("invalid run configuration")?;
        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn init_logging(tracer: &mut RunTracer) {
    if tracer.setup() {
        return;
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Plan { source } => {
            let config = source.load()?;
            println!("{}", PipelinePlan::trading(&config).outline());
            Ok(())
        }
        Command::Run {
            ticker,
            date,
            source,
            json,
            snapshot,
        } => {
            let config = source.load()?;
            let mut tracer = RunTracer::new(config.tracing.clone());
            init_logging(&mut tracer);

            let date =
                date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let orchestrator = build_orchestrator(&config, None)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; stopping at the next stage boundary");
                    on_interrupt.cancel();
                }
            });

            info!(ticker = %ticker, date = %date, "Trading desk starting");
            let result = orchestrator.run_with_cancel(&ticker, &date, cancel).await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(failure) => {
                    warn!(
                        completed = failure.completed_stages.len(),
                        version = failure.snapshot.version,
                        "Run did not finish"
                    );
                    tracer.cleanup();
                    return Err(failure).context(format!("run for {} on {} failed", ticker, date));
                }
            };

            let mut metadata = BTreeMap::new();
            metadata.insert(
                "analysts".to_string(),
                serde_json::Value::from(config.analysts.clone()),
            );
            let metadata = tracer.add_metadata(metadata);
            tracer.cleanup();

            let mut summary = RunSummary::from_outcome(&outcome).with_metadata(metadata);
            if json {
                if snapshot {
                    summary = summary.with_snapshot(outcome.snapshot.clone());
                }
                println!("{}", summary.to_json()?);
            } else {
                println!("{}", summary.render_text());
            }
            Ok(())
        }
    }
}
