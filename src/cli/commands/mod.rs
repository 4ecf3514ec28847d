//! CLI command implementations (facade).
//!
//! `run.rs` calls [`execute`]; implementations live in `commands/*`.

mod classify;
mod common;
mod deploy;
mod down;
mod json_emit;
mod status;

use anyhow::Result;

use super::args::Commands;
use crate::{Config, ExitCode};

use classify::execute_classify_command;
use deploy::execute_deploy_command;
use down::execute_down_command;
use status::execute_status_command;

pub use deploy::{ConsoleSink, write_report};
pub use status::render_status_table;

/// Run one subcommand. The returned code is the process exit code.
pub async fn execute(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Deploy {
            report,
            json,
            reruns,
            rerun_interval,
        } => execute_deploy_command(config, report.as_deref(), json, reruns, rerun_interval).await,
        Commands::Down { json } => execute_down_command(config, json).await,
        Commands::Status { json } => execute_status_command(config, json).await,
        Commands::Classify {
            message,
            service,
            json,
        } => execute_classify_command(config, &message, service.as_deref(), json).await,
    }
}
