// Drumgrid command-line entry point
// Loads a capture, runs the analysis and writes the result as JSON

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use drumgrid_lib::capture::{ingest_file, InputFormat};
use drumgrid_lib::pipeline::{analyze, Diagnostics, TraceWriter};
use drumgrid_lib::AnalysisConfig;

#[derive(Parser, Debug)]
#[command(name = "drumgrid")]
#[command(about = "Infer tempo, rhythm grid and hierarchical rhythm from a drum capture", long_about = None)]
struct Args {
    /// Capture file: Standard MIDI file or JSON strike list
    input: PathBuf,

    /// Capture format
    #[arg(short, long, value_enum, default_value = "auto")]
    format: InputFormat,

    /// JSON config file; missing values use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the analysis JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append the analysis trace to this JSONL file
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Record grouped beat events in the trace
    #[arg(long)]
    debug_events: bool,

    /// Record interval clusters in the trace
    #[arg(long)]
    debug_clusters: bool,

    /// Record rated tempo hypotheses in the trace
    #[arg(long)]
    debug_rated_clusters: bool,

    /// Record the final tracker population in the trace
    #[arg(long)]
    debug_trackers: bool,

    /// Log intermediate results
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    let capture = ingest_file(&args.input, args.format)
        .with_context(|| format!("Failed to load capture {}", args.input.display()))?;

    let diagnostics = Diagnostics {
        events: args.debug_events,
        clusters: args.debug_clusters,
        rated_clusters: args.debug_rated_clusters,
        trackers: args.debug_trackers,
    };

    let analysis = analyze(&capture.strikes, &config, &diagnostics)
        .with_context(|| format!("Analysis of {} failed", args.input.display()))?
        .with_input_sha256(capture.sha256);

    log::info!(
        "{:.1} BPM, {} slots, repeating unit of {} slots",
        analysis.tempo.bpm,
        analysis.rhythm.len(),
        analysis.repeating_unit.len()
    );
    log::info!("Grid: {}", analysis.rhythm);
    log::info!("Hierarchy:\n{}", analysis.hierarchy);

    if let Some(path) = &args.trace {
        let writer = TraceWriter::new(path.clone());
        writer
            .write_batch(&analysis.trace)
            .with_context(|| format!("Failed to write trace {}", writer.path().display()))?;
    }

    let json = serde_json::to_string_pretty(&analysis).context("Failed to serialize analysis")?;

    match &args.output {
        Some(path) => {
            fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Analysis {} saved to {}", analysis.id, path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
