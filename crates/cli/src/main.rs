mod cli;
mod simulate;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use lanes_core::{load_dotenv, LanesConfig};
use lanes_scheduler::find_allocation_slot;

use crate::cli::{CliArgs, Command};

fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = LanesConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    config.log_summary();

    let output = match args.command {
        Command::Config => config.summary(),
        Command::Slot { priority } => {
            let map = config.allocation_map();
            json!({
                "priority": priority,
                "lane": find_allocation_slot(&map, priority),
                "allocations": map,
            })
        }
        Command::Simulate { tasks, duration_ms, cancel_every } => {
            let report = simulate::run(&config, tasks, Duration::from_millis(duration_ms), cancel_every)?;
            serde_json::to_value(report)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
