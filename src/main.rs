use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use inclinefit::codec::CodecCapabilities;
use inclinefit::config::AppConfig;
use inclinefit::logging::{init_logging, LogLevel};
use inclinefit::synth::SynthesisParams;
use inclinefit::{analysis, codec, report, rewrite};

/// inclinefit - treadmill incline injection for FIT files
///
/// Rewrites indoor running sessions with a synthetic GPS track and altitude
/// profile so platforms compute grade-adjusted pace, and inspects FIT files
/// for optional-field completeness.
#[derive(Parser)]
#[command(name = "inclinefit")]
#[command(version = "0.1.0")]
#[command(about = "Treadmill incline injection for FIT files", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject a synthetic track into an indoor session
    Inject {
        /// Input FIT file
        input: PathBuf,

        /// Output FIT file
        #[arg(short, long)]
        output: PathBuf,

        /// Start latitude in degrees
        #[arg(long)]
        lat: f64,

        /// Start longitude in degrees
        #[arg(long)]
        lon: f64,

        /// Start altitude in meters
        #[arg(long)]
        alt: Option<f64>,

        /// Course bearing in degrees (0 = north, clockwise)
        #[arg(long)]
        bearing: Option<f64>,

        /// Constant grade ratio, e.g. 0.10 for 10%
        #[arg(long)]
        grade: Option<f64>,

        /// Peak-to-peak altitude noise in meters
        #[arg(long)]
        noise: Option<f64>,

        /// Noise seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Tag the session as a virtual run instead of a generic one
        #[arg(long)]
        r#virtual: bool,
    },

    /// Analyze a FIT file's optional-field completeness
    Analyze {
        /// FIT file to inspect
        file: PathBuf,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inject every FIT file in a directory
    Batch {
        /// Directory of input FIT files
        dir: PathBuf,

        /// Directory for rewritten files
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Start latitude in degrees
        #[arg(long)]
        lat: f64,

        /// Start longitude in degrees
        #[arg(long)]
        lon: f64,

        /// Constant grade ratio
        #[arg(long)]
        grade: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::load_or_default(),
    };
    if cli.verbose > 0 {
        config.logging.level = LogLevel::from_verbosity(cli.verbose);
    }
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Inject {
            input,
            output,
            lat,
            lon,
            alt,
            bearing,
            grade,
            noise,
            seed,
            r#virtual: virtual_tag,
        } => {
            let params = build_params(&config, lat, lon, alt, bearing, grade, noise, seed);
            inject_file(
                &input,
                &output,
                &params,
                &config,
                virtual_tag,
                &CodecCapabilities::default(),
            )?;
        }
        Commands::Analyze { file, json } => {
            let messages = codec::decode_file(&file)
                .with_context(|| format!("decoding {}", file.display()))?;
            let result = analysis::analyze(&messages);
            if json {
                println!("{}", report::render_json(&result)?);
            } else {
                println!("{}", report::render(&result));
            }
        }
        Commands::Batch {
            dir,
            out_dir,
            lat,
            lon,
            grade,
        } => {
            let params = build_params(&config, lat, lon, None, None, grade, None, None);
            batch_inject(&dir, &out_dir, &params, &config)?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_params(
    config: &AppConfig,
    lat: f64,
    lon: f64,
    alt: Option<f64>,
    bearing: Option<f64>,
    grade: Option<f64>,
    noise: Option<f64>,
    seed: Option<u64>,
) -> SynthesisParams {
    let defaults = &config.synthesis;
    let mut params = SynthesisParams::new(lat, lon);
    params.start_altitude = alt.unwrap_or(defaults.start_altitude);
    params.bearing_degrees = bearing.unwrap_or(defaults.bearing_degrees);
    params.grade = grade.unwrap_or(defaults.grade);
    params.noise_amplitude = noise.unwrap_or(defaults.noise_amplitude);
    params.noise_seed = seed;
    params
}

fn inject_file(
    input: &Path,
    output: &Path,
    params: &SynthesisParams,
    config: &AppConfig,
    virtual_tag: bool,
    capabilities: &CodecCapabilities,
) -> Result<()> {
    println!(
        "{} {}",
        "Injecting incline into".green().bold(),
        input.display()
    );

    let messages =
        codec::decode_file(input).with_context(|| format!("decoding {}", input.display()))?;
    let (rewritten, stats) = rewrite::inject(
        &messages,
        params,
        config.synthesis.knot_policy,
        virtual_tag,
        capabilities,
    );
    let outcome = codec::encode_file(output, &rewritten)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "  {} records, {} laps, {} m ascent",
        stats.records_updated, stats.laps_updated, stats.total_ascent
    );
    if outcome.skipped > 0 {
        println!(
            "{}",
            format!("  {} messages could not be encoded", outcome.skipped).yellow()
        );
    }
    println!(
        "{} {}",
        "✓ Wrote".green(),
        output.display()
    );
    Ok(())
}

fn batch_inject(
    dir: &Path,
    out_dir: &Path,
    params: &SynthesisParams,
    config: &AppConfig,
) -> Result<()> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("fit"))
        })
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        println!("{}", "No FIT files found".yellow());
        return Ok(());
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let progress = ProgressBar::new(inputs.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let capabilities = CodecCapabilities::default();
    let mut failures = 0usize;
    for input in &inputs {
        if let Some(name) = input.file_name().and_then(|n| n.to_str()) {
            progress.set_message(name.to_string());
        }
        let output = out_dir.join(input.file_name().unwrap_or_default());
        if let Err(err) = inject_file(input, &output, params, config, true, &capabilities) {
            eprintln!(
                "{}",
                format!("✗ {}: {:#}", input.display(), err).red()
            );
            failures += 1;
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    println!(
        "{}",
        format!("Processed {} files, {} failed", inputs.len(), failures).bold()
    );
    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, inputs.len());
    }
    Ok(())
}
