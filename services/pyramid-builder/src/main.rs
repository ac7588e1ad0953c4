//! Pyramid builder service.
//!
//! One-shot batch job: opens a source Zarr dataset, attaches a CRS,
//! optionally restricts the time dimension, builds a multi-resolution
//! pyramid and persists it as a multi-group Zarr store.

mod job;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pyramid_common::CrsCode;
use pyramid_core::InterpolationMethod;

use job::{parse_time_range, BuildJob};

#[derive(Parser, Debug)]
#[command(name = "pyramid-builder")]
#[command(about = "One-shot multi-resolution pyramid builder")]
struct Args {
    /// Source dataset URI (path, file://, http(s):// or s3://)
    #[arg(short, long)]
    source: String,

    /// Number of pyramid levels (level 0 finest)
    #[arg(short, long, default_value_t = 2)]
    levels: usize,

    /// Interpolation method (nearest, bilinear, cubic)
    #[arg(short, long, default_value = "bilinear")]
    method: String,

    /// CRS to stamp onto the source dataset
    #[arg(long, default_value = "EPSG:4326")]
    crs: String,

    /// Restrict the time dimension to an index range, e.g. "0..10"
    #[arg(long)]
    time_range: Option<String>,

    /// Output store path
    #[arg(short, long, default_value = "public/data/regridded.zarr")]
    output: PathBuf,

    /// Replace an existing store at the output path
    #[arg(long)]
    overwrite: bool,

    /// Skip writing the consolidated metadata document
    #[arg(long)]
    skip_consolidated: bool,

    /// Apply CF scale/offset decoding when reading source values
    #[arg(long)]
    decode_values: bool,

    /// Regrid pyramid levels in parallel
    #[arg(long)]
    parallel: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting pyramid builder");

    let time_range = args
        .time_range
        .as_deref()
        .map(parse_time_range)
        .transpose()?;

    let job = BuildJob {
        source: args.source,
        levels: args.levels,
        method: InterpolationMethod::from_str(&args.method),
        crs: CrsCode::parse(&args.crs)?,
        time_range,
        output: args.output,
        overwrite: args.overwrite,
        consolidated: !args.skip_consolidated,
        decode_values: args.decode_values,
        parallel: args.parallel,
    };

    job.run()
}
