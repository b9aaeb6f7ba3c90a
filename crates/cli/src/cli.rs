use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect lane configuration and drive the tiered-lane scheduler.
#[derive(Parser, Debug)]
#[command(name = "lanes", about = "Tiered-lane task scheduler")]
pub struct CliArgs {
    /// Path to a TOML config file with `[[lanes]]` tables
    #[arg(long, env = "LANES_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration as JSON
    Config,

    /// Show which lane a task of the given priority would be assigned to
    Slot {
        #[arg(long)]
        priority: u32,
    },

    /// Run a synthetic workload through the scheduler
    Simulate {
        /// Number of tasks to submit
        #[arg(long, default_value = "32")]
        tasks: usize,

        /// How long each task body runs
        #[arg(long, default_value = "50")]
        duration_ms: u64,

        /// Cancel every k-th task right after submitting it (0 = never)
        #[arg(long, default_value = "0")]
        cancel_every: usize,
    },
}
