//! livedead: count live and dead cells in a pair of fluorescence images.
//!
//! Runs the five-stage pipeline on a live-stain image and a dead-stain
//! image, prints the two counts, and optionally the per-stage
//! diagnostics, the candidate table, or everything as JSON. Useful for:
//!
//! - Batch counting with fixed parameters
//! - Tuning tolerances and radii by stopping after a given stage
//! - Checking how many live candidates the double-counting rule removes
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin livedead -- [OPTIONS] <LIVE_PATH> <DEAD_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use livedead_pipeline::{
    Channel, ChannelPair, Clock, LiveDeadReport, ParticleAnalyzer, Pipeline, PipelineDiagnostics,
    PipelineParameters, RollingBallSegmenter, Stage,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Count live and dead cells in paired fluorescence images.
///
/// Live candidates lying closer than the double-counting distance to a
/// dead candidate are treated as the same cell and counted as dead only.
#[derive(Parser)]
#[command(name = "livedead", version)]
struct Cli {
    /// Live-channel image (PNG, JPEG, BMP, TIFF, WebP).
    live_path: PathBuf,

    /// Dead-channel image, same dimensions as the live image.
    dead_path: PathBuf,

    /// Binning factor applied to both images before processing.
    #[arg(long, default_value_t = PipelineParameters::DEFAULT_BINNING, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    binning: u32,

    /// Rolling-ball radius in pixels (0 disables background subtraction).
    #[arg(long, default_value_t = PipelineParameters::DEFAULT_ROLLING_BALL_RADIUS)]
    rolling_ball: f64,

    /// Maxima noise tolerance for the live channel.
    #[arg(long, default_value_t = PipelineParameters::DEFAULT_TOLERANCE)]
    live_tolerance: f64,

    /// Maxima noise tolerance for the dead channel.
    #[arg(long, default_value_t = PipelineParameters::DEFAULT_TOLERANCE)]
    dead_tolerance: f64,

    /// Minimum live particle size in pixels.
    #[arg(long, default_value_t = PipelineParameters::DEFAULT_PARTICLE_RADIUS)]
    live_radius: f64,

    /// Minimum dead particle size in pixels.
    #[arg(long, default_value_t = PipelineParameters::DEFAULT_PARTICLE_RADIUS)]
    dead_radius: f64,

    /// Double-counting distance in pixels.
    #[arg(long, default_value_t = PipelineParameters::DEFAULT_DOUBLE_COUNTING_RADIUS)]
    double_counting: f64,

    /// Named setting as `Name=value` (e.g. `"Live tolerance=12"`).
    ///
    /// Applied after the individual flags. May be repeated.
    #[arg(long = "setting", value_name = "NAME=VALUE")]
    settings: Vec<String>,

    /// Full parameter set as a JSON string.
    ///
    /// When provided, all other parameter flags and settings are
    /// ignored. Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Run stage by stage and stop after this stage.
    #[arg(long, value_enum)]
    stop_after: Option<StageArg>,

    /// Print per-stage diagnostics to stderr.
    #[arg(long)]
    diagnostics: bool,

    /// Write the live candidate table as CSV.
    #[arg(long)]
    table: Option<PathBuf>,

    /// Output counts, table, and diagnostics as JSON.
    #[arg(long)]
    json: bool,

    /// Log capability internals (maxima, thresholds).
    #[arg(short, long)]
    verbose: bool,
}

/// Stage selection for `--stop-after`.
#[derive(Clone, Copy, ValueEnum)]
enum StageArg {
    /// LIVE - Preprocess image.
    PreprocessLive,
    /// LIVE - locate cells.
    LocateLive,
    /// DEAD - Preprocess image.
    PreprocessDead,
    /// DEAD - locate cells.
    LocateDead,
    /// Analyze.
    Analyze,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::PreprocessLive => Self::PreprocessLive,
            StageArg::LocateLive => Self::LocateLive,
            StageArg::PreprocessDead => Self::PreprocessDead,
            StageArg::LocateDead => Self::LocateDead,
            StageArg::Analyze => Self::Analyze,
        }
    }
}

/// Build [`PipelineParameters`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise the flags are
/// rendered as named settings, `--setting` values are appended, and the
/// whole list is parsed the way a plugin host would.
fn params_from_cli(cli: &Cli) -> Result<PipelineParameters, String> {
    if let Some(ref json) = cli.config_json {
        let params: PipelineParameters =
            serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?;
        params.validate().map_err(|e| format!("Invalid --config-json: {e}"))?;
        return Ok(params);
    }

    let flags = PipelineParameters {
        automatic: cli.stop_after.is_none(),
        binning: cli.binning,
        rolling_ball_radius: cli.rolling_ball,
        live_tolerance: cli.live_tolerance,
        dead_tolerance: cli.dead_tolerance,
        live_radius: cli.live_radius,
        dead_radius: cli.dead_radius,
        double_counting_radius: cli.double_counting,
    };

    let mut settings: Vec<(String, String)> = flags
        .to_settings()
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect();
    for raw in &cli.settings {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("Error parsing --setting {raw:?}: expected NAME=VALUE"))?;
        if livedead_pipeline::params::canonical_name(name.trim()).is_none() {
            eprintln!("Warning: ignoring unknown setting {:?}", name.trim());
        }
        settings.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    PipelineParameters::from_settings(settings).map_err(|e| format!("Invalid parameters: {e}"))
}

fn read_image(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let params = params_from_cli(cli)?;
    let live_bytes = read_image(&cli.live_path)?;
    let dead_bytes = read_image(&cli.dead_path)?;

    let channels = ChannelPair::from_bytes(&live_bytes, &dead_bytes)
        .map_err(|e| format!("Error decoding images: {e}"))?;
    let dims = channels.dimensions();
    tracing::info!(
        live = %cli.live_path.display(),
        dead = %cli.dead_path.display(),
        width = dims.width,
        height = dims.height,
        "images loaded"
    );

    let mut pipeline = Pipeline::with_capabilities(
        channels,
        params,
        RollingBallSegmenter::default(),
        ParticleAnalyzer::default(),
        StdClock,
    )
    .map_err(|e| format!("Invalid parameters: {e}"))?;

    let last = cli.stop_after.map_or(Stage::LAST, Stage::from);
    if pipeline.parameters().automatic {
        pipeline
            .run_current()
            .map_err(|e| format!("Pipeline error: {e}"))?;
    } else {
        for stage in Stage::ALL.into_iter().take(last.index() + 1) {
            pipeline
                .run_stage(stage)
                .map_err(|e| format!("Pipeline error: {e}"))?;
        }
    }

    if cli.diagnostics {
        eprintln!("{}", pipeline.diagnostics().report());
        eprintln!();
    }

    let Some(report) = pipeline.report() else {
        print_partial(&pipeline, last);
        return Ok(());
    };

    if let Some(ref path) = cli.table {
        std::fs::write(path, report.table.to_csv())
            .map_err(|e| format!("Error writing table to {}: {e}", path.display()))?;
        eprintln!("Table written to {} ({} rows)", path.display(), report.table.len());
    }

    if cli.json {
        print_json(&report, pipeline.diagnostics())?;
    } else {
        for (name, value) in report.scalars() {
            println!("{name}: {value}");
        }
    }

    Ok(())
}

/// Summarise the artifacts of a run stopped before analysis.
fn print_partial<P, E, C>(pipeline: &Pipeline<P, E, C>, last: Stage)
where
    P: livedead_pipeline::Preprocessor,
    E: livedead_pipeline::Extractor,
    C: Clock,
{
    println!("Stopped after: {last}");
    for channel in Channel::ALL {
        if let Some(mask) = pipeline.segmented(channel) {
            let dims = mask.dimensions();
            println!(
                "{} mask: {}x{}, {} foreground pixels",
                channel.label(),
                dims.width,
                dims.height,
                mask.foreground_pixels(),
            );
        }
        if let Some(centroids) = pipeline.centroids(channel) {
            println!("{} cells: {}", channel.label(), centroids.len());
        }
    }
}

/// Shape of `--json` output.
#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a LiveDeadReport,
    diagnostics: &'a PipelineDiagnostics,
}

fn print_json(report: &LiveDeadReport, diagnostics: &PipelineDiagnostics) -> Result<(), String> {
    let output = JsonOutput {
        report,
        diagnostics,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| format!("Error serializing output: {e}"))?;
    println!("{json}");
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
