//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "vantage")]
#[command(about = "Feature flag dependency resolution and query cache maintenance", long_about = None)]
pub struct Cli {
    /// Config TOML file; `VANTAGE_*` environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the local-evaluation payload for a team's flags
    Resolve {
        /// JSON array of flags
        #[arg(long)]
        flags: PathBuf,

        #[arg(long)]
        team: i64,
    },

    /// Check whether creating or updating a flag would be accepted
    Check {
        /// JSON array of the team's current flags
        #[arg(long)]
        flags: PathBuf,

        /// JSON of the flag as it would be written
        #[arg(long)]
        proposed: PathBuf,
    },

    /// List a team's stale insights, oldest first
    Stale {
        #[arg(long)]
        team: i64,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Drop freshness records older than the given age
    Cleanup {
        #[arg(long)]
        team: i64,

        #[arg(long)]
        older_than_secs: u64,
    },

    /// Run the stale cleanup loop for the configured teams until Ctrl-C
    Sweep,

    /// Ping the configured cache backends
    Health,
}
