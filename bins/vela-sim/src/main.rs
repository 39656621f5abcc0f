//! Vela simulator.
//!
//! Replays a JSON scenario against a fresh in-memory deployment and prints one
//! JSON report per step to stdout. Logs go to stderr.

mod config;
mod scenario;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use vela_protocol::Protocol;

use crate::config::SimConfig;
use crate::scenario::{Labels, Scenario};

#[derive(Parser, Debug)]
#[command(name = "vela-sim", version, about = "Replay vote-escrow scenarios")]
struct Args {
    /// Scenario file to replay.
    scenario: PathBuf,

    /// Optional JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level filter (overrides config and VELA_LOG_LEVEL).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: "text" or "json".
    #[arg(long)]
    log_format: Option<String>,

    /// Resume from a saved snapshot instead of a fresh deployment.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write the final state here.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Stop at the first failing step.
    #[arg(long)]
    fail_fast: bool,
}

fn main() {
    let args = Args::parse();

    let mut config = match SimConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    };
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &args.log_format {
        config.log_format = format.clone();
    }

    init_logging(&config.log_level, &config.log_format);

    if let Err(e) = run(&args, &config) {
        error!(error = %format!("{e:#}"), "simulation failed");
        process::exit(1);
    }
}

fn run(args: &Args, config: &SimConfig) -> Result<()> {
    let text = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let scenario = Scenario::from_json(&text)?;

    let mut protocol = match &args.resume {
        Some(path) => Protocol::load_snapshot(path)
            .with_context(|| format!("loading snapshot {}", path.display()))?,
        None => Protocol::new(config.protocol_config(), config.genesis).context("deploying protocol")?,
    };
    info!(
        steps = scenario.steps.len(),
        now = protocol.now(),
        scenario = %args.scenario.display(),
        "replaying scenario"
    );

    let mut labels = Labels::default();
    for role in [
        &config.roles.token,
        &config.roles.escrow_account,
        &config.roles.treasury,
        &config.roles.rewards_account,
        &config.roles.distributor,
        &config.roles.team,
    ] {
        labels.resolve(role);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = scenario::run(&mut protocol, &scenario, &mut labels, &mut out, args.fail_fast)?;

    if let Some(path) = &args.snapshot {
        protocol
            .save_snapshot(path)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(path = %path.display(), "snapshot written");
    }

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        now = protocol.now(),
        total_supply = %protocol.total_voting_power()?,
        "scenario complete"
    );
    Ok(())
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
