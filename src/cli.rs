// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `willowcal`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "willowcal",
    version,
    about = "Bootstrap a multi-repository workspace and supervise its services.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WILLOWCAL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Clone every repository and run its setup commands.
    Init {
        /// Path to the config file (TOML).
        #[arg(value_name = "CONFIG", default_value = "Willowcal.toml")]
        config: PathBuf,

        /// Parse + validate, print the workspace, but don't execute anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start every configured service and stream its output until Ctrl-C.
    Run {
        /// Path to the config file (TOML).
        #[arg(value_name = "CONFIG", default_value = "Willowcal.toml")]
        config: PathBuf,

        /// Parse + validate, print the workspace, but don't execute anything.
        #[arg(long)]
        dry_run: bool,
    },
}

impl Command {
    pub fn config(&self) -> &PathBuf {
        match self {
            Command::Init { config, .. } | Command::Run { config, .. } => config,
        }
    }

    pub fn dry_run(&self) -> bool {
        match self {
            Command::Init { dry_run, .. } | Command::Run { dry_run, .. } => *dry_run,
        }
    }
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
