//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `bobbin`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bobbin",
    version,
    about = "Background-task scheduler demo and config checker.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to a scheduler config file (TOML). Built-in defaults otherwise.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BOBBIN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a chain, a fan-in and unique submissions against the in-memory store.
    Demo {
        /// How many times the fetch step asks for a retry before succeeding.
        #[arg(long, default_value_t = 2)]
        flaky_fetches: u32,

        /// Make the fan-in's checksum branch fail, cancelling the join.
        #[arg(long)]
        fail_branch: bool,
    },

    /// Parse and validate the config, then print the effective values.
    CheckConfig,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
