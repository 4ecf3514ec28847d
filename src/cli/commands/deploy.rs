//! Deploy command implementation
//!
//! Handles `rdeploy deploy [--report <path>] [--json] [--reruns N]`.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use rdeploy_engine::{DeployEvent, HealthCheckResult, ProgressSink};

use super::common::{build_orchestrator, connect_gateway};
use crate::{Config, DeployError, DeploymentReport, ExitCode};

/// Progress lines on stderr, so stdout stays free for `--json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn on_event(&self, event: &DeployEvent) {
        match event {
            DeployEvent::PhaseStarted {
                index,
                name,
                services,
            } => eprintln!("→ Phase {index} ({name}): starting {services} service(s)"),
            DeployEvent::StartAttempt { service, attempt } if *attempt > 1 => {
                eprintln!("  ↻ {service}: start attempt {attempt}");
            }
            DeployEvent::StartFailed { service, reason } => {
                eprintln!("  ✗ {service}: {reason}");
            }
            DeployEvent::ServiceSettled {
                service, result, ..
            } => {
                let mark = if *result == HealthCheckResult::Healthy {
                    "✓"
                } else {
                    "✗"
                };
                eprintln!("  {mark} {service}: {result}");
            }
            DeployEvent::PhaseFinished {
                index,
                outcome,
                elapsed,
                ..
            } => eprintln!(
                "  Phase {index} {outcome} in {:.1}s",
                elapsed.as_secs_f64()
            ),
            _ => {}
        }
    }
}

/// Execute the deploy command.
pub async fn execute_deploy_command(
    config: &Config,
    report_path: Option<&Path>,
    json: bool,
    reruns: u32,
    rerun_interval: u64,
) -> Result<ExitCode> {
    let phases = config.plan().map_err(DeployError::from)?;
    let gateway = connect_gateway(config).await?;
    let orchestrator = build_orchestrator(gateway, config, Arc::new(ConsoleSink))?;

    info!(
        phases = phases.len(),
        reruns,
        advisory = orchestrator.classifier().has_advisory(),
        "Starting deployment"
    );
    let report = orchestrator
        .run_supervised(&phases, reruns, Duration::from_secs(rerun_interval))
        .await;

    if let Some(path) = report_path {
        write_report(&report, path)?;
        info!(path = %path.display(), "Deployment report written");
    }

    if json {
        println!("{}", canonical(&report)?);
    } else {
        print!("{}", report.render());
    }

    Ok(report.exit_code())
}

fn canonical(report: &DeploymentReport) -> Result<String, DeployError> {
    report
        .to_canonical_json()
        .map_err(|e| DeployError::ReportWriteFailed {
            path: "<stdout>".to_string(),
            reason: e.to_string(),
        })
}

/// Write `report` to `path` as canonical JSON.
///
/// # Errors
///
/// Returns `DeployError::ReportWriteFailed` if serialization or the write fails.
pub fn write_report(report: &DeploymentReport, path: &Path) -> Result<(), DeployError> {
    let failed = |reason: String| DeployError::ReportWriteFailed {
        path: path.display().to_string(),
        reason,
    };
    let json = report.to_canonical_json().map_err(|e| failed(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| failed(e.to_string()))
}
