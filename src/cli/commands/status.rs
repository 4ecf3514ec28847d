//! Status command implementation
//!
//! Handles `rdeploy status` and `rdeploy status --json`. Read-only: nothing
//! is started or stopped.

use anyhow::Result;
use std::fmt::Write as _;
use std::sync::Arc;

use rdeploy_engine::{NoopSink, ServiceStatusReport};

use super::common::{build_orchestrator, connect_gateway};
use super::json_emit::emit_status_json;
use crate::{Config, DeployError, ExitCode};

/// Execute the status command.
pub async fn execute_status_command(config: &Config, json: bool) -> Result<ExitCode> {
    let phases = config.plan().map_err(DeployError::from)?;
    let gateway = connect_gateway(config).await?;
    let orchestrator = build_orchestrator(gateway, config, Arc::new(NoopSink))?;

    let statuses = orchestrator.status(&phases).await;

    if json {
        println!("{}", emit_status_json(&statuses)?);
    } else {
        print!("{}", render_status_table(&statuses));
    }
    Ok(ExitCode::SUCCESS)
}

/// Fixed-width table of service, phase, status and readiness.
#[must_use]
pub fn render_status_table(statuses: &[ServiceStatusReport]) -> String {
    let width = statuses
        .iter()
        .map(|s| s.service.len())
        .max()
        .unwrap_or(0)
        .max("SERVICE".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  PHASE  STATUS   READINESS", "SERVICE");
    for s in statuses {
        let status = s
            .status
            .map_or_else(|| "-".to_string(), |status| status.to_string());
        let readiness = match (&s.readiness, &s.error) {
            (_, Some(error)) => format!("error: {error}"),
            (Some(readiness), None) => readiness.clone(),
            (None, None) => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<width$}  {:<5}  {:<7}  {readiness}",
            s.service, s.phase, status
        );
    }
    out
}
