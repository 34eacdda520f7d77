//! Barfeed CLI — fetch daily bars for a ticker list and publish the snapshot.
//!
//! Commands:
//! - `run` — resolve every ticker through the source chain and write artifacts
//! - `config` — print the effective configuration as TOML
//!
//! Exit codes: 0 success, 1 resolved count below threshold, 2 bad input or
//! configuration, 3 systemic failure (no source answered; nothing written),
//! 4 output artifacts could not be written.
//!
//! stdout carries only the one-line run summary; everything else is logged
//! to stderr.

use anyhow::{Context, Result};
use barfeed_core::calendar::parse_iso_date;
use barfeed_core::data::{build_adapters, HttpTransport};
use barfeed_runner::{
    read_ticker_file, run_pipeline, LogProgress, PipelineError, RunConfig, RunReport,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_BELOW_THRESHOLD: u8 = 1;
const EXIT_INPUT: u8 = 2;
const EXIT_SYSTEMIC: u8 = 3;
const EXIT_OUTPUT: u8 = 4;

#[derive(Parser)]
#[command(
    name = "barfeed",
    about = "Barfeed — resilient multi-source daily OHLCV snapshot"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch bars for every ticker and write the output artifacts.
    Run(Overrides),
    /// Print the effective configuration (file plus overrides) as TOML.
    Config(Overrides),
}

#[derive(Args)]
struct Overrides {
    /// Path to a TOML config file. Built-in defaults otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ticker list, one per line.
    #[arg(long)]
    tickers: Option<PathBuf>,

    /// Output directory (also holds the previous run's snapshot).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Historical date to resolve (YYYY-MM-DD). Latest bar otherwise.
    #[arg(long, value_parser = parse_date_arg)]
    date: Option<NaiveDate>,

    /// Minimum resolved symbols before the run counts as degraded.
    #[arg(long)]
    min_resolved: Option<usize>,

    /// Concurrent batches per source.
    #[arg(long)]
    workers: Option<usize>,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_iso_date(s).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

impl Overrides {
    fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(tickers) = &self.tickers {
            config.tickers_file = tickers.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if self.date.is_some() {
            config.target = self.date;
        }
        if let Some(n) = self.min_resolved {
            config.min_resolved = n;
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(overrides) => run_cmd(&overrides),
        Commands::Config(overrides) => match print_config(&overrides) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                ExitCode::from(EXIT_INPUT)
            }
        },
    }
}

fn print_config(overrides: &Overrides) -> Result<()> {
    let config = overrides.resolve()?;
    print!("{}", config.to_toml()?);
    Ok(())
}

fn run_cmd(overrides: &Overrides) -> ExitCode {
    let config = match overrides.resolve() {
        Ok(c) => c,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_INPUT);
        }
    };

    match execute(&config) {
        Ok(report) => {
            print_summary(&report);
            if report.below_threshold() {
                ExitCode::from(EXIT_BELOW_THRESHOLD)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::SystemicFailure { .. }) => EXIT_SYSTEMIC,
        Some(PipelineError::Output(_)) => EXIT_OUTPUT,
        _ => EXIT_INPUT,
    }
}

fn execute(config: &RunConfig) -> Result<RunReport> {
    let symbols = read_ticker_file(&config.tickers_file).map_err(PipelineError::from)?;
    info!(
        tickers = symbols.len(),
        file = %config.tickers_file.display(),
        "ticker list loaded"
    );

    let transport = HttpTransport::new(config.http.timeout(), &config.http.user_agent)
        .context("building HTTP client")?;
    let adapters = build_adapters(&config.sources, Arc::new(transport), &config.breaker);

    let as_of = chrono::Local::now().date_naive();
    let progress = LogProgress::default();
    Ok(run_pipeline(config, &symbols, adapters, as_of, &progress)?)
}

fn print_summary(report: &RunReport) {
    println!("{}", report.summary_line());
    for (source, n) in &report.resolved_by {
        info!(source = %source, fresh = n, "resolved by source");
    }
    if let Some(date) = report.archived {
        info!(%date, "archived");
    }
    if report.dropped > 0 {
        info!(dropped = report.dropped, "symbols no longer listed");
    }
    if report.lagging > 0 {
        info!(lagging = report.lagging, "fresh bars older than the expected trading day");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barfeed_runner::{OutputError, TickerError};

    #[test]
    fn exit_codes_are_distinct_per_failure() {
        let systemic = anyhow::Error::from(PipelineError::SystemicFailure { failed_calls: 4 });
        let output = anyhow::Error::from(PipelineError::Output(OutputError::Io {
            path: PathBuf::from("/ro/latest.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }));
        let input = anyhow::Error::from(PipelineError::Input(TickerError::Empty {
            path: PathBuf::from("tickers.txt"),
        }));

        assert_eq!(exit_code_for(&systemic), EXIT_SYSTEMIC);
        assert_eq!(exit_code_for(&output), EXIT_OUTPUT);
        assert_eq!(exit_code_for(&input), EXIT_INPUT);
        assert_eq!(exit_code_for(&anyhow::anyhow!("bad config")), EXIT_INPUT);
        assert_ne!(EXIT_OUTPUT, EXIT_BELOW_THRESHOLD);
    }
}
