pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "adwatch")]
#[command(about = "Polls classified-ad listing pages and alerts on new posts", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/adwatch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll all sources forever, one cycle per interval
    Run {
        /// Override the configured interval (e.g., "15m", "1h")
        #[arg(short, long)]
        interval: Option<String>,

        /// Wait one interval before the first cycle
        #[arg(long)]
        no_initial_cycle: bool,
    },
    /// Run a single cycle and exit
    Once,
    /// Show identities already alerted on
    Known {
        /// How many of the most recent entries to list
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}
