use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rxclaims::prelude::*;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rxcli")]
#[command(version, about = "Pharmacy claims analytics - compute fill metrics and per-drug rankings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all analyzers and write the JSON artifacts
    Run(RunArgs),
    /// Show summary statistics for a batch
    Stats(InputArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Directory containing the pharmacy CSV file
    #[arg(long)]
    pharmacies: PathBuf,
    /// Directory containing claim JSON files
    #[arg(long)]
    claims: PathBuf,
    /// Directory containing revert JSON files
    #[arg(long)]
    reverts: PathBuf,
    /// Configuration file (TOML)
    #[arg(long, env = "RXCLAIMS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Directory the artifacts are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Number of worker threads
    #[arg(long)]
    threads: Option<usize>,
    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Stats(args) => cmd_stats(args),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            if let Some(claims_err) = e.downcast_ref::<ClaimsError>() {
                eprintln!("{}", claims_err.user_message());
            }
            std::process::exit(1);
        }
    }
}

fn load_config(args: &InputArgs) -> Result<AnalyticsConfig> {
    AnalyticsConfig::load(args.config.as_deref()).context("loading configuration")
}

fn load_dataset(args: &InputArgs, config: &AnalyticsConfig) -> Result<ClaimsDataset> {
    ClaimsDataset::load(&args.pharmacies, &args.claims, &args.reverts, config)
        .context("loading claims batch")
}

/// Returns whether every analyzer succeeded
fn cmd_run(args: RunArgs) -> Result<bool> {
    let mut builder = ConfigBuilder::from_config(load_config(&args.input)?);
    if let Some(dir) = &args.output_dir {
        builder = builder.output_dir(dir);
    }
    if args.threads.is_some() {
        builder = builder.parallel_threads(args.threads);
    }
    if args.no_progress {
        builder = builder.progress_bar(false);
    }
    let config = builder.build();

    if let Some(threads) = config.parallel_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring thread pool")?;
    }

    let dataset = load_dataset(&args.input, &config)?;
    info!(
        pharmacies = dataset.pharmacies.len(),
        claims = dataset.claims.len(),
        reverts = dataset.reverts.len(),
        "loaded claims batch"
    );

    let report = dataset.analytics(EngineOptions::from(&config)).run();
    let summary = JsonExporter::from_config(&config)
        .export(&report, &config)
        .context("writing artifacts")?;

    for path in &summary.written {
        println!("Wrote {}", path.display());
    }
    for analyzer in &summary.skipped {
        println!("Skipped {} (nothing to compute)", analyzer);
    }
    for analyzer in &summary.failed {
        eprintln!("Failed {}", analyzer);
    }

    Ok(summary.is_complete())
}

fn cmd_stats(args: InputArgs) -> Result<bool> {
    let config = ConfigBuilder::from_config(load_config(&args)?)
        .progress_bar(false)
        .build();
    let dataset = load_dataset(&args, &config)?;
    dataset.statistics().print_summary();
    Ok(true)
}
