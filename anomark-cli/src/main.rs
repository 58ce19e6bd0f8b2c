//! Anomark CLI — benchmark sweep entry point.
//!
//! One visible flag: the path to the sweep configuration. The hidden
//! `worker` subcommand is how the distributor re-invokes this executable as
//! an isolated lane process; it reads its assignment from stdin.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use anomark_bench::{distribute, run_worker, Resources, SweepConfig};

const DEFAULT_RESULTS_DIR: &str = "runs";

/// Anomark: anomaly-detection model benchmark sweeps
#[derive(Parser, Debug)]
#[command(name = "anomark", version, about, long_about = None)]
struct Cli {
    /// Path to the sweep configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Internal lane worker; reads its assignment from stdin
    #[command(hide = true)]
    Worker,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Some(Command::Worker) => {
            run_worker(io::stdin().lock())?;
        }
        None => {
            let config_path = cli.config.context("--config <PATH> is required")?;
            println!("Benchmark sweep started. This can take a while depending on the configuration.");
            let sweep = SweepConfig::load(&config_path)?;
            distribute(
                &sweep,
                &Resources::detect(),
                Path::new(DEFAULT_RESULTS_DIR),
            )?;
            println!("Finished gathering results.");
        }
    }
    Ok(())
}
