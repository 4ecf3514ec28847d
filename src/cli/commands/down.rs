//! Down command implementation
//!
//! Handles `rdeploy down [--json]`: stop every configured service, last
//! phase first. A failed stop is reported and the sweep carries on.

use anyhow::Result;
use std::sync::Arc;

use rdeploy_engine::NoopSink;

use super::common::{build_orchestrator, connect_gateway};
use super::json_emit::emit_stop_json;
use crate::{Config, DeployError, ExitCode};

/// Execute the down command.
pub async fn execute_down_command(config: &Config, json: bool) -> Result<ExitCode> {
    let phases = config.plan().map_err(DeployError::from)?;
    let gateway = connect_gateway(config).await?;
    let orchestrator = build_orchestrator(gateway, config, Arc::new(NoopSink))?;

    let report = orchestrator.stop_all(&phases).await;

    if json {
        println!("{}", emit_stop_json(&report)?);
    } else {
        for service in &report.stopped {
            println!("✓ stopped {service}");
        }
        for (service, error) in &report.failed {
            println!("✗ {service}: {error}");
        }
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::INTERNAL
    })
}
