use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use fs_churn::churn::{
    ChurnOptions, ChurnRequest, RunLimit, RunSummary, StopHandle, Tunables, serve_lines,
};
use fs_churn::logging;

#[derive(Debug, Parser)]
#[command(name = "fs-churn")]
#[command(about = "Keep a directory tree under randomized, reproducible change")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Churn a directory in this process. Without a limit, runs until Ctrl-C.
    Run {
        /// Directory to churn.
        path: PathBuf,
        /// Stop after this many milliseconds.
        #[arg(long, conflicts_with = "waves")]
        duration_ms: Option<u64>,
        /// Stop after this many waves.
        #[arg(long)]
        waves: Option<u64>,
        /// Seed for a reproducible run.
        #[arg(long)]
        seed: Option<u64>,
        /// Number of workers.
        #[arg(long)]
        workers: Option<usize>,
        /// JSON file with engine tunables.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Serve the control protocol as JSON lines on stdin/stdout.
    Engine {
        /// JSON file with engine tunables.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_tunables(config: Option<&Path>) -> Result<Tunables> {
    match config {
        Some(path) => Tunables::from_json_file(path)
            .with_context(|| format!("failed to load tunables from {}", path.display())),
        None => Ok(Tunables::default()),
    }
}

fn install_stop_on_ctrlc(stop: StopHandle) -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    let result = INIT.get_or_init(|| {
        ctrlc::set_handler(move || {
            stop.stop();
        })
        .map_err(|e| e.to_string())
    });

    match result {
        Ok(()) => Ok(()),
        Err(msg) => Err(anyhow::anyhow!("failed to install Ctrl-C handler: {msg}")),
    }
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("seed: {}", summary.seed);
        println!("workers: {}", summary.worker_count);
        println!("waves: {}", summary.waves);
        println!("events: {}", summary.events);
        println!("failures: {}", summary.failures);
        println!("elapsed ms: {}", summary.elapsed_ms);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            path,
            duration_ms,
            waves,
            seed,
            workers,
            config,
            json,
        } => {
            let tunables = load_tunables(config.as_deref())?;
            let limit = match (duration_ms, waves) {
                (Some(ms), _) => RunLimit::Duration(Duration::from_millis(ms)),
                (None, Some(waves)) => RunLimit::Waves(waves),
                (None, None) => RunLimit::UntilStopped,
            };
            let options = ChurnOptions {
                seed,
                worker_count: workers,
            };

            let stop = StopHandle::new();
            install_stop_on_ctrlc(stop.clone())?;

            let summary = ChurnRequest::new()
                .with_path(path)
                .with_limit(limit)
                .with_options(options)
                .with_tunables(tunables)
                .with_stop(stop)
                .run()
                .await?;
            print_summary(&summary, json)?;
        }
        Command::Engine { config } => {
            let tunables = load_tunables(config.as_deref())?;
            serve_lines(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), tunables)
                .await
                .context("engine transport failed")?;
        }
    }

    Ok(())
}
