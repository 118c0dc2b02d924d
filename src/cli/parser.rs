//! CLI argument parsing with clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tiered cache and background job runtime
#[derive(Parser, Debug)]
#[command(name = "tiercache")]
#[command(about = "Tiered cache and background job runtime")]
#[command(long_about = "
tiercache runs a three-tier cache (hot, query, cold) together with named
background job queues, configured from layered TOML files and TIERCACHE_*
environment variables.

EXAMPLES:
    # Start the queues and wait for Ctrl-C
    tiercache run

    # Use a custom configuration file
    tiercache --config /etc/tiercache/production.toml run

    # Probe the cold store
    tiercache health

    # Print hit/miss counters and queue counts as JSON
    tiercache stats

    # Validate configuration and exit
    tiercache check-config
")]
#[command(version = crate::clap_long_version())]
pub struct Cli {
    /// Subcommand to execute, `run` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Loads this single TOML file instead of the layered `config/`
    /// directory. TIERCACHE_* environment variables still apply on top.
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the queue registry and wait for Ctrl-C (default)
    ///
    /// Expired warm-tier entries are swept and the cold store is probed
    /// every `--maintenance-interval` seconds.
    Run {
        /// Seconds between maintenance sweeps
        #[arg(long, value_name = "SECS", default_value = "60", value_parser = super::validation::validate_interval_secs)]
        maintenance_interval: u64,
    },
    /// Probe the cold store and print the health report
    ///
    /// Exits non-zero when the store is unreachable.
    Health,
    /// Print per-tier hit/miss counters and per-queue counts
    Stats,
    /// Validate configuration and exit
    CheckConfig,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            maintenance_interval: 60,
        }
    }
}

impl Cli {
    /// Log level forced by `--verbose` / `--quiet`, if any.
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            None
        }
    }

    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }
}
