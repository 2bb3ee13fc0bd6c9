/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use gcl_synth::config::NetworkConfigManager;
use gcl_synth::schedule::ScheduleReport;
use gcl_synth::scheduler::NetworkScheduler;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Synthesise gate-control schedules for a network description.
///
/// Example:
///   gcl-synth --network line.yaml --output schedule.yaml --timeout-ms 5000
#[derive(Debug, Parser)]
#[command(
    name = "gcl-synth",
    about = "Gate-control list synthesis for time-aware switched networks",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML network description.
    #[arg(short = 'n', long = "network")]
    network: PathBuf,

    /// Write the schedule report here instead of stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Solve timeout in milliseconds; overrides the description's value.
    #[arg(short = 't', long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Include per-hop packet series in the report.
    #[arg(long = "hops", default_value_t = false)]
    hops: bool,
}

async fn run(cli: &Cli) -> Result<()> {
    let mut manager = NetworkConfigManager::new();
    manager.load_from_file(&cli.network)?;
    let mut network = manager.build_network()?;
    let mut options = manager.scheduler_options()?;
    if let Some(ms) = cli.timeout_ms {
        options.timeout = Some(Duration::from_millis(ms));
    }

    let scheduler = NetworkScheduler::with_builtin(options);
    info!(solver = scheduler.solver_name(), "Scheduling");
    let summary = scheduler
        .schedule_async(&mut network)
        .await
        .context("Scheduling failed")?;
    if summary.violations > 0 {
        warn!(violations = summary.violations, "Schedule failed its own check");
    }

    let yaml = ScheduleReport::from_network(&network, cli.hops)
        .to_yaml()
        .context("Cannot serialise schedule report")?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, yaml)
                .with_context(|| format!("Cannot write schedule report: {}", path.display()))?;
            info!("Schedule written to: {}", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(
        network = %cli.network.display(),
        output  = ?cli.output,
        timeout_ms = ?cli.timeout_ms,
        hops = cli.hops,
        "Configuration"
    );

    if let Err(e) = run(&cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}
