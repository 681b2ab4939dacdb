//! geobatch - batch geocoding command line tool

use anyhow::Result;
use clap::Parser;
use geobatch::{aggregate_dir, Config, DispatchReport, FailurePolicy, Pipeline};
use geobatch_common::logging::{init_logging, LogConfig, LogLevel};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "geobatch")]
#[command(author, version, about = "Batch geocode a CSV of street addresses")]
struct Cli {
    /// Address CSV with a header row: object id, street, city, state, zip
    #[arg(required_unless_present = "aggregate_only")]
    input: Option<PathBuf>,

    /// Settings file (defaults to ./config.yml when present)
    #[arg(short, long, env = "GEOBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// geocodeAddresses endpoint, overrides geocodeURL
    #[arg(long)]
    geocode_url: Option<String>,

    /// Directory for response artifacts and the aggregated CSV
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Addresses per request
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// What to do when a batch fails: abort or isolate
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    /// Geocode and persist artifacts, but do not aggregate
    #[arg(long, conflicts_with = "aggregate_only")]
    dispatch_only: bool,

    /// Only rebuild the aggregated CSV from existing artifacts
    #[arg(long)]
    aggregate_only: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref url) = self.geocode_url {
            config.geocode_url = url.clone();
        }
        if let Some(ref dir) = self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("geobatch")
        .build();

    // Environment variables take precedence over the flag
    let _log_guard = match log_config.merge_env().and_then(|c| init_logging(&c)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        },
    };

    if let Err(e) = run(cli).await {
        error!(error = %e, "geobatch failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    if cli.aggregate_only {
        let summary = aggregate_dir(&config.output_dir).await?;
        println!(
            "Wrote {} rows from {} artifacts to {}",
            summary.rows,
            summary.artifacts,
            summary.output.display()
        );
        return Ok(());
    }

    let Some(input) = cli.input else {
        anyhow::bail!("An input file is required unless --aggregate-only is given");
    };

    let pipeline = Pipeline::new(&config)?.with_progress(std::io::stderr().is_terminal());

    if cli.dispatch_only {
        let report = pipeline.dispatch(&input).await?;
        println!(
            "Persisted {} artifacts for {} batches in {}",
            report.artifacts.len(),
            report.batches,
            config.output_dir.display()
        );
        return ensure_complete(&report);
    }

    let summary = pipeline.run(&input).await?;
    info!(
        records = summary.records,
        batches = summary.dispatch.batches,
        rows = summary.aggregate.rows,
        "Run finished"
    );
    println!(
        "Wrote {} rows from {} artifacts to {}",
        summary.aggregate.rows,
        summary.aggregate.artifacts,
        summary.aggregate.output.display()
    );
    ensure_complete(&summary.dispatch)
}

fn ensure_complete(report: &DispatchReport) -> Result<()> {
    if report.failures.is_empty() {
        return Ok(());
    }

    for failure in &report.failures {
        error!(
            batch = failure.batch_index,
            records = failure.records,
            error = %failure.error,
            "Batch was not geocoded"
        );
    }
    anyhow::bail!(
        "{} of {} batches failed to geocode",
        report.failures.len(),
        report.batches
    )
}
