//! kcusum - kernel CUSUM change-point detection
//!
//! Usage:
//!   kcusum detect --input series.dat --threshold 0.015 --delta 0.1
//!   kcusum detect --xyz traj.xyz --axis z --report-json run.json
//!   kcusum fit --input series.dat --catalog norm,gamma,lognorm
//!   kcusum extract --xyz traj.xyz --axis x --output series.dat
//!   kcusum simulate --length 400 --shift-at 200 --shift 2.0 --output series.dat
//!   kcusum list

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use kcusum_core::series::{load_series, save_series};
use kcusum_core::trajectory::{load_xyz, mean_coordinate_series};
use kcusum_core::{
    Axis, CsvTraceReporter, DistributionKind, JsonReporter, LogReporter, Pipeline,
    PipelineConfig, Reporter, RunState,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "kcusum")]
#[command(about = "Kernel CUSUM change-point detection against a fitted reference")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit, generate a reference and run the detector
    Detect {
        #[command(flatten)]
        source: Source,

        /// JSON pipeline configuration; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Detection threshold h
        #[arg(long)]
        threshold: Option<f64>,

        /// Drift correction subtracted from every increment
        #[arg(long)]
        delta: Option<f64>,

        /// Stop after this many recursion steps
        #[arg(long)]
        max_steps: Option<usize>,

        /// Seed for the reference stream
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        fitting: FitArgs,

        /// Write the full run report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Write the statistic trace as CSV
        #[arg(long)]
        trace_csv: Option<PathBuf>,

        /// Persist the generated reference stream
        #[arg(long)]
        reference_out: Option<PathBuf>,
    },

    /// Rank candidate distributions for a series
    Fit {
        #[command(flatten)]
        source: Source,

        #[command(flatten)]
        fitting: FitArgs,
    },

    /// Reduce an XYZ trajectory to a per-frame mean coordinate series
    Extract {
        #[arg(long)]
        xyz: PathBuf,

        #[arg(long, default_value = "x")]
        axis: Axis,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a synthetic normal series with a mean shift
    Simulate {
        #[arg(short = 'n', long, default_value = "400")]
        length: usize,

        /// First index carrying the shift
        #[arg(long, default_value = "200")]
        shift_at: usize,

        /// Size of the mean shift
        #[arg(long, default_value = "2.0")]
        shift: f64,

        /// Noise standard deviation
        #[arg(long, default_value = "1.0")]
        noise: f64,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the supported distribution families
    List,
}

/// Where the observed series comes from
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Flat series file, one value per line
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// XYZ trajectory reduced to a mean coordinate per frame
    #[arg(long)]
    xyz: Option<PathBuf>,
}

#[derive(Args)]
struct FitArgs {
    /// Coordinate used with --xyz
    #[arg(long)]
    axis: Option<Axis>,

    /// Histogram bins for fitting
    #[arg(long)]
    bins: Option<usize>,

    /// Candidate families (comma-separated)
    #[arg(long, value_delimiter = ',')]
    catalog: Vec<DistributionKind>,
}

impl FitArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(axis) = self.axis {
            config.axis = axis;
        }
        if let Some(bins) = self.bins {
            config.fitter.bins = bins;
        }
        if !self.catalog.is_empty() {
            config.fitter.catalog = self.catalog.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Detect {
            source,
            config,
            threshold,
            delta,
            max_steps,
            seed,
            fitting,
            report_json,
            trace_csv,
            reference_out,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_json_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if let Some(threshold) = threshold {
                config.detector.threshold = threshold;
            }
            if let Some(delta) = delta {
                config.detector.delta = delta;
            }
            if max_steps.is_some() {
                config.detector.max_steps = max_steps;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            fitting.apply(&mut config);

            run_detect(
                &source,
                config,
                report_json.as_deref(),
                trace_csv.as_deref(),
                reference_out.as_deref(),
            )
        }
        Commands::Fit { source, fitting } => {
            let mut config = PipelineConfig::default();
            fitting.apply(&mut config);
            run_fit(&source, config)
        }
        Commands::Extract { xyz, axis, output } => run_extract(&xyz, axis, &output),
        Commands::Simulate {
            length,
            shift_at,
            shift,
            noise,
            seed,
            output,
        } => run_simulate(length, shift_at, shift, noise, seed, &output),
        Commands::List => {
            run_list();
            Ok(())
        }
    }
}

fn load_signal(source: &Source, axis: Axis) -> Result<Vec<f64>> {
    match (&source.input, &source.xyz) {
        (Some(path), _) => {
            load_series(path).with_context(|| format!("reading series {}", path.display()))
        }
        (None, Some(path)) => {
            let frames =
                load_xyz(path).with_context(|| format!("reading trajectory {}", path.display()))?;
            mean_coordinate_series(&frames, axis)
                .with_context(|| format!("reducing trajectory {}", path.display()))
        }
        (None, None) => bail!("either --input or --xyz is required"),
    }
}

fn run_detect(
    source: &Source,
    config: PipelineConfig,
    report_json: Option<&Path>,
    trace_csv: Option<&Path>,
    reference_out: Option<&Path>,
) -> Result<()> {
    let signal = load_signal(source, config.axis)?;
    info!(len = signal.len(), "Loaded signal.");

    let pipeline = Pipeline::new(config.clone())?;
    let result = pipeline.run(&signal, &mut pipeline.rng())?;
    let report = result.report(&config);

    LogReporter.report(&report)?;
    if let Some(path) = report_json {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        JsonReporter::new(BufWriter::new(file)).report(&report)?;
    }
    if let Some(path) = trace_csv {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        CsvTraceReporter::new(BufWriter::new(file)).report(&report)?;
    }
    if let Some(path) = reference_out {
        save_series(path, &result.reference)
            .with_context(|| format!("writing reference {}", path.display()))?;
    }

    let verdict = match result.outcome.state {
        RunState::Detected { index } => format!("change point at index {index}"),
        RunState::Truncated { steps } => format!("no detection within {steps} steps"),
        RunState::Exhausted | RunState::Accumulating => "no change point".to_string(),
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 KCUSUM Detection Result                      ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║ Samples: {:51} ║", signal.len());
    println!("║ Reference: {:49} ║", result.fitted.kind.name());
    println!("║ Threshold h: {:47} ║", config.detector.threshold);
    println!("║ Delta: {:53} ║", config.detector.delta);
    println!("║ Peak statistic: {:44.6} ║", result.outcome.peak());
    println!("║ Verdict: {:51} ║", verdict);
    println!("╚══════════════════════════════════════════════════════════════╝");
    Ok(())
}

fn run_fit(source: &Source, config: PipelineConfig) -> Result<()> {
    let signal = load_signal(source, config.axis)?;
    let summary = Pipeline::new(config)?.summarize(&signal)?;

    println!(
        "{:>4}  {:<12} {:>12} {:>14} {:>12} {:>12} {:>8}  params",
        "rank", "family", "sse", "log-lik", "aic", "bic", "ks"
    );
    for (rank, candidate) in summary.ranked.iter().enumerate() {
        let params = candidate
            .fitted
            .params
            .iter()
            .map(|(name, value)| format!("{name}={value:.6}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:>4}  {:<12} {:>12.6e} {:>14.4} {:>12.4} {:>12.4} {:>8.4}  {}",
            rank + 1,
            candidate.fitted.kind.name(),
            candidate.fitted.error,
            candidate.log_likelihood,
            candidate.aic,
            candidate.bic,
            candidate.ks_statistic,
            params
        );
    }
    for failure in &summary.failures {
        println!("   -  {:<12} not fitted: {}", failure.kind.name(), failure.reason);
    }
    Ok(())
}

fn run_extract(xyz: &Path, axis: Axis, output: &Path) -> Result<()> {
    let frames = load_xyz(xyz).with_context(|| format!("reading trajectory {}", xyz.display()))?;
    let series = mean_coordinate_series(&frames, axis)
        .with_context(|| format!("reducing trajectory {}", xyz.display()))?;
    save_series(output, &series).with_context(|| format!("writing {}", output.display()))?;
    info!(
        frames = frames.len(),
        values = series.len(),
        axis = %axis,
        "Extracted mean coordinate series."
    );
    Ok(())
}

fn run_simulate(
    length: usize,
    shift_at: usize,
    shift: f64,
    noise: f64,
    seed: Option<u64>,
    output: &Path,
) -> Result<()> {
    let noise = Normal::new(0.0, noise).context("invalid noise level")?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let series: Vec<f64> = (0..length)
        .map(|i| {
            let level = if i >= shift_at { shift } else { 0.0 };
            level + noise.sample(&mut rng)
        })
        .collect();

    save_series(output, &series).with_context(|| format!("writing {}", output.display()))?;
    info!(length, shift_at, shift, "Simulated shifted series.");
    Ok(())
}

fn run_list() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Supported Distribution Families                 ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    for kind in DistributionKind::COMMON {
        println!("║ {:12} - {:45} ║", kind.name(), kind.param_names().join(", "));
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
}
