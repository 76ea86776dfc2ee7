use anyhow::{Context, Result};
use clap::Parser;
use clovars_core::{History, SimulationConfig, SimulationRunner};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "clovars",
    version,
    about = "Simulate clonal variability in growing cell colonies"
)]
struct Cli {
    /// JSON settings file; built-in defaults are used when omitted.
    settings: Option<PathBuf>,

    /// Root seed, overriding the one in the settings file.
    #[arg(long, env = "CLOVARS_SEED")]
    seed: Option<u64>,

    /// Destination for JSON-lines output; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads used to advance colonies.
    #[arg(long)]
    threads: Option<usize>,

    /// Emit per-colony summaries instead of per-cell snapshots.
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.run.seed = Some(seed);
    }

    let history = match cli.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("failed to build worker pool")?
            .install(|| simulate(&config))?,
        None => simulate(&config)?,
    };

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_history(&history, BufWriter::new(file), cli.summary)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => write_history(&history, BufWriter::new(io::stdout().lock()), cli.summary)
            .context("failed to write history to stdout")?,
    }

    info!(
        seed = history.seed,
        frames = history.frames.len(),
        reason = %history.stop_reason,
        "run complete"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

fn load_settings(path: &Path) -> Result<SimulationConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings in {}", path.display()))
}

fn simulate(config: &SimulationConfig) -> Result<History> {
    let runner = SimulationRunner::new(config).context("invalid simulation settings")?;
    info!(seed = runner.seed(), colonies = runner.colonies().len(), "starting run");
    runner.run().context("simulation aborted")
}

fn write_history<W: Write>(history: &History, writer: W, summary: bool) -> io::Result<()> {
    if summary {
        history.to_summary_json_lines(writer)
    } else {
        history.to_json_lines(writer)
    }
}
