//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments and installs the tracing subscriber
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers, raced against Ctrl-C
//! - Handles all error output

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use rdeploy_advisory::redaction::redact;
use rdeploy_utils::error::{ConfigError, GatewayError};
use rdeploy_utils::logging::{LogFormat, init_tracing};

use super::args::Cli;
use super::commands;
use crate::{Config, DeployError, ExitCode};

const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(2);

/// Main CLI execution function.
///
/// This function handles ALL output including errors. It returns
/// `Err(ExitCode)` for any non-zero outcome, including an aborted deployment
/// that was reported normally. main.rs only calls `std::process::exit()`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(e) = init_tracing(cli.verbose, format) {
        eprintln!("✗ Failed to initialize logging: {e}");
    }

    let cli_args = cli.cli_args();
    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => return Err(report_error(err, "config")),
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.operation();
    let result = rt.block_on(async {
        tokio::select! {
            result = commands::execute(cli.command, &config) => result,
            () = interrupted() => Err(DeployError::Interrupted.into()),
        }
    });
    // Blocking runtime calls still in flight after an interrupt are abandoned
    rt.shutdown_timeout(RUNTIME_SHUTDOWN);

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => Err(report_error(error, operation)),
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::debug!(error = %e, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

/// Print `error` for the user and pick the exit code.
fn report_error(error: anyhow::Error, operation: &str) -> ExitCode {
    match into_deploy_error(error) {
        Ok(deploy_error) => {
            eprintln!("{}", redact(&deploy_error.display_for_user()));
            if deploy_error.to_exit_code() == ExitCode::INTERNAL {
                eprintln!("  while running: rdeploy {operation}");
            }
            deploy_error.to_exit_code()
        }
        Err(other) => {
            eprintln!("✗ Unexpected error: {}", redact(&format!("{other:#}")));
            eprintln!("\n  General troubleshooting:");
            eprintln!("    - Run with --verbose for more detailed output");
            eprintln!("    - Check that the container runtime is installed and running");
            ExitCode::INTERNAL
        }
    }
}

/// Recover the typed error behind an `anyhow::Error`, looking through context.
fn into_deploy_error(error: anyhow::Error) -> Result<DeployError, anyhow::Error> {
    let error = match error.downcast::<DeployError>() {
        Ok(deploy_error) => return Ok(deploy_error),
        Err(error) => error,
    };
    let error = match error.downcast::<ConfigError>() {
        Ok(config_error) => return Ok(config_error.into()),
        Err(error) => error,
    };
    error.downcast::<GatewayError>().map(DeployError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_config_error_behind_context_maps_to_cli_args() {
        let error: anyhow::Error = Err::<(), _>(ConfigError::MissingRequired("phases".to_string()))
            .context("Failed to load config file: .rdeploy/config.toml")
            .unwrap_err();
        let deploy_error = into_deploy_error(error).unwrap();
        assert_eq!(deploy_error.to_exit_code(), ExitCode::CLI_ARGS);
    }

    #[test]
    fn test_unavailable_runtime_maps_to_gateway_exit_code() {
        let error = anyhow::Error::from(GatewayError::Unavailable {
            reason: "docker: not found".to_string(),
        });
        assert_eq!(
            into_deploy_error(error).unwrap().to_exit_code(),
            ExitCode::GATEWAY_UNAVAILABLE
        );
    }

    #[test]
    fn test_untyped_error_stays_untyped() {
        assert!(into_deploy_error(anyhow::anyhow!("boom")).is_err());
    }
}
