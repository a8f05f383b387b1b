use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use memoflight::config::Config;

mod logging;
mod stresstest;
mod workloads;

use stresstest::perform_stresstest;
use workloads::WorkloadsConfig;

/// Command line interface parser.
#[derive(Parser)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the workload definition file.
    #[arg(long, short, value_name = "FILE")]
    workloads: PathBuf,

    /// Duration of the stresstest.
    #[arg(long, short, value_parser = humantime::parse_duration)]
    duration: Duration,
}

fn main() {
    if let Err(error) = run() {
        memoflight::logging::ensure_log_error(&error);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // parse configs
    let workloads_file =
        std::fs::File::open(cli.workloads).context("failed to open workloads file")?;
    let workloads: WorkloadsConfig =
        serde_yaml::from_reader(workloads_file).context("failed to parse workloads YAML")?;

    let config = Config::get(cli.config.as_deref())?;

    // SAFETY: The runtime, and with it every other thread, is only started below.
    let _guard = unsafe { logging::init(&config) }?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(perform_stresstest(config, workloads, cli.duration))
}
