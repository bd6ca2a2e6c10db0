use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use scrip_config::{AppConfig, LogFormat};
use tracing::{info, warn};

use crate::pipeline::{Pipeline, RunOptions, RunOutcome};
use crate::telemetry::init_tracing;

/// Exit status when the partitions failed the completeness check.
pub const EXIT_UNVALIDATED: u8 = 2;

#[derive(Parser)]
#[command(author, version, about = "Reconcile instrument listings from two providers")]
pub struct Cli {
    /// Additional TOML configuration layered over the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter directive, e.g. `info` or `scrip_core=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Log output format (pretty or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, normalize, load sinks, reconcile and write reports
    Run(RunArgs),
    /// Same as `run` without touching the sinks
    Diff(SourceArgs),
    /// Download both listings and store raw snapshots only
    Fetch(FetchArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Clone, Default)]
pub struct SourceArgs {
    /// Left (preferred) listing: URL or file path
    #[arg(long)]
    left: Option<String>,
    /// Right listing: URL or file path
    #[arg(long)]
    right: Option<String>,
    /// Directory for the report artifacts
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    sources: SourceArgs,
    /// Skip the document store and relational table
    #[arg(long)]
    skip_load: bool,
}

#[derive(Args, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    sources: SourceArgs,
    /// Destination of `<label>_raw.csv` and `<label>_sample.csv`
    #[arg(long)]
    raw_dir: Option<PathBuf>,
}

impl SourceArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(left) = &self.left {
            config.sources.left.location = left.clone();
        }
        if let Some(right) = &self.right {
            config.sources.right.location = right.clone();
        }
        if let Some(output) = &self.output {
            config.report.output_dir = output.clone();
        }
    }
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.unwrap_or(config.logging.format);
    let _guard = init_tracing(&level, format, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            args.sources.apply(&mut config);
            config.validate()?;
            let outcome = Pipeline::from_config(config)?
                .run(RunOptions {
                    load_sinks: !args.skip_load,
                })
                .await?;
            Ok(finish(&outcome))
        }
        Commands::Diff(args) => {
            args.apply(&mut config);
            config.validate()?;
            let outcome = Pipeline::from_config(config)?
                .run(RunOptions { load_sinks: false })
                .await?;
            Ok(finish(&outcome))
        }
        Commands::Fetch(args) => {
            args.sources.apply(&mut config);
            config.validate()?;
            let Some(raw_dir) = args.raw_dir.clone().or_else(|| config.fetch.raw_dir.clone())
            else {
                bail!("--raw-dir is required when fetch.raw_dir is not configured");
            };
            let written = Pipeline::from_config(config)?.snapshot(&raw_dir).await?;
            for paths in &written {
                info!(raw = %paths.raw.display(), sample = %paths.sample.display(), "snapshot written");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn finish(outcome: &RunOutcome) -> ExitCode {
    for load in &outcome.loads {
        info!(sink = %load.sink, loaded = load.loaded, skipped = load.skipped, "sink loaded");
    }
    info!(
        common = %outcome.reports.common.display(),
        only_left = %outcome.reports.only_left.display(),
        only_right = %outcome.reports.only_right.display(),
        "reports ready"
    );
    if !outcome.sink_failures.is_empty() {
        warn!(failures = ?outcome.sink_failures, "some sinks were not updated");
    }
    if outcome.validated() {
        ExitCode::SUCCESS
    } else {
        warn!("partition check failed; reports were written but the run is not validated");
        ExitCode::from(EXIT_UNVALIDATED)
    }
}
