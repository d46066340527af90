//! Moving-target finder catalog builder
//!
//! Fetches predicted moon and planet positions for HST exposures, places them
//! on the display tile grid and updates the finder catalog.
//!
//! Usage:
//!   cargo run --bin mtfinder -- --manifest exposures.json --select 'ib4v*'
//!   cargo run --bin mtfinder -- --manifest exposures.json --missing-only --reproc

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, ArgGroup, Parser};
use log::LevelFilter;
use mtfinder::ephemeris::{HorizonsClient, SerializedSource, TargetCatalog};
use mtfinder::exposure::ExposureManifest;
use mtfinder::{
    run_batch, BatchContext, BatchOptions, MemoryRepository, PipelineConfig, Reconciler,
    Selection,
};

/// Type alias for the error type used throughout this module
type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Moving-target finder catalog builder
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Places predicted moon/planet positions on HST display tiles",
    long_about = None
)]
#[command(group(ArgGroup::new("selection").required(true).args(["select", "missing_only"])))]
struct Args {
    /// JSON manifest of exposure metadata
    #[arg(short, long)]
    manifest: PathBuf,

    /// Exposure ids to process, as a shell glob (`*`, `?`, `[...]`)
    #[arg(short, long)]
    select: Option<String>,

    /// Process only exposures with targets lacking a stored position
    #[arg(long, action = ArgAction::SetTrue)]
    missing_only: bool,

    /// Overwrite existing entries
    #[arg(short, long, action = ArgAction::SetTrue)]
    reproc: bool,

    /// Pipeline configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Finder catalog snapshot, created if missing
    #[arg(long, default_value = "finders.json")]
    store: PathBuf,

    /// Worker threads across exposures (overrides the configuration)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(args: &Args) -> Result<()> {
    let level: LevelFilter = args
        .log_level
        .parse()
        .map_err(|_| format!("Unknown log level '{}'", args.log_level))?;
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();
    if let Some(path) = &args.log_file {
        let log_file = File::create(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

/// Prints a section header with a title and separator line
fn print_section_header(title: &str) {
    println!("\n{}:", title);
    println!("-------------------------------------------------------");
}

fn run(args: &Args) -> Result<()> {
    let mut config = PipelineConfig::load_or_default(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;

    let targets = match &config.targets_file {
        Some(path) => TargetCatalog::from_file(path)?,
        None => TargetCatalog::builtin(),
    };
    let manifest = ExposureManifest::load(&args.manifest)?;
    let repository = MemoryRepository::open(&args.store)?;
    let reconciler = Reconciler::new(config.grid, repository)?;
    let source = SerializedSource::new(HorizonsClient::new(config.horizons.clone())?, config.retry);

    let options = BatchOptions {
        selection: match &args.select {
            Some(pattern) => Selection::Glob(pattern.clone()),
            None => Selection::MissingOnly,
        },
        reproc: args.reproc,
        workers: config.workers,
        window_minutes: config.horizons.window_minutes,
        plate_scale_fallback: config.plate_scale_fallback(),
    };

    let context = BatchContext {
        reconciler: &reconciler,
        exposures: &manifest,
        targets: &targets,
        source: &source,
    };
    let summary = run_batch(&context, &options)?;

    reconciler.repository().save(&args.store)?;
    log::info!("Saved finder catalog to {}", args.store.display());

    print_section_header("Summary");
    println!("{}", summary);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_logging(&args) {
        eprintln!("Failed to set up logging: {}", err);
        return ExitCode::from(2);
    }

    log::info!("Command-line arguments used: {:?}", args);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
