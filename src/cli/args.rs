//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::CliArgs;

/// rdeploy - phased, readiness-gated service deployment
#[derive(Parser, Debug)]
#[command(name = "rdeploy")]
#[command(about = "Bring up a service stack in phases, gated on readiness, with retries and circuit breaking")]
#[command(long_about = r#"
rdeploy starts the services of a stack in ordered phases. A phase only begins
once every service of the previous phase is ready. Starts are retried with
exponential backoff behind a per-service circuit breaker, and a required
service that cannot be brought up aborts the deployment with a remedy.

EXAMPLES:
  # Deploy the plan in .rdeploy/config.toml
  rdeploy deploy

  # Keep a canonical JSON report of the run
  rdeploy deploy --report deploy-report.json

  # Re-run the plan up to 3 times after an abort, 30s apart
  rdeploy deploy --reruns 3 --rerun-interval 30

  # Stop every service, last phase first
  rdeploy down

  # Show status and readiness of every configured service
  rdeploy status --json

  # Look up a remedy for an error message
  rdeploy classify "pull access denied for myorg/api"

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .rdeploy/config.toml
  Use --config to specify an explicit config file path

EXIT CODES:
  0 success (including partial), 1 internal error, 2 configuration error,
  3 deployment aborted, 4 runtime unavailable, 130 interrupted
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Compose file passed to the runtime
    #[arg(long, global = true)]
    pub compose_file: Option<PathBuf>,

    /// Compose project name
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Runtime binary (default: docker)
    #[arg(long, global = true)]
    pub runtime: Option<String>,

    /// Seconds between readiness polls
    #[arg(long, global = true)]
    pub poll_interval: Option<u64>,

    /// Start attempts per service before giving up
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Consecutive failed start sequences that open a circuit
    #[arg(long, global = true)]
    pub circuit_threshold: Option<u32>,

    /// Seconds an open circuit waits before a trial start
    #[arg(long, global = true)]
    pub circuit_cooldown: Option<u64>,

    /// Never consult the advisory service
    #[arg(long, global = true)]
    pub no_advisory: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy every phase in order
    Deploy {
        /// Write the deployment report as canonical JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the deployment report as canonical JSON on stdout
        #[arg(long)]
        json: bool,

        /// Re-run the whole plan up to N more times after an abort
        #[arg(long, default_value_t = 0)]
        reruns: u32,

        /// Seconds to wait between re-runs
        #[arg(long, default_value_t = 30)]
        rerun_interval: u64,
    },

    /// Stop every configured service, last phase first
    Down {
        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Show status and readiness of every configured service
    Status {
        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up a remedy for an error message
    Classify {
        /// Error message to classify
        message: String,

        /// Service the message came from (added to advisory prompts)
        #[arg(long)]
        service: Option<String>,

        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Operation name used in error reports.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Deploy { .. } => "deploy",
            Self::Down { .. } => "down",
            Self::Status { .. } => "status",
            Self::Classify { .. } => "classify",
        }
    }
}

impl Cli {
    /// Overrides for configuration discovery.
    #[must_use]
    pub fn cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            poll_interval: self.poll_interval,
            max_attempts: self.max_attempts,
            circuit_threshold: self.circuit_threshold,
            circuit_cooldown: self.circuit_cooldown,
            gateway_binary: self.runtime.clone(),
            compose_file: self.compose_file.clone(),
            project: self.project.clone(),
            no_advisory: self.no_advisory,
        }
    }
}

/// Build the clap command, for completions and tests.
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
