//! Common helpers used across CLI commands
//!
//! Gateway construction with an availability check, and orchestrator wiring
//! from the effective configuration.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use rdeploy_advisory::{AdvisoryBackend, backend_from_config};
use rdeploy_engine::ProgressSink;

use crate::{ComposeGateway, Config, DeployError, Orchestrator, WorkloadGateway};

/// Build the compose gateway and make sure the runtime answers.
///
/// # Errors
///
/// Returns `DeployError::Gateway(GatewayError::Unavailable)` (exit code 4)
/// when the runtime is missing or not responding.
pub async fn connect_gateway(config: &Config) -> Result<Arc<dyn WorkloadGateway>> {
    let gateway = ComposeGateway::new(config.gateway.clone(), config.defaults.probe_timeout())
        .map_err(DeployError::from)?;
    gateway
        .check_available()
        .await
        .map_err(DeployError::from)?;
    debug!(binary = %config.gateway.binary, "Workload runtime is available");
    Ok(Arc::new(gateway))
}

/// Advisory backend for this run, if enabled and usable.
///
/// A misconfigured backend is not fatal: the run continues without escalation.
pub fn advisory_backend(config: &Config) -> Option<Arc<dyn AdvisoryBackend>> {
    match backend_from_config(&config.advisory) {
        Ok(backend) => backend,
        Err(e) => {
            warn!(error = %e, "Advisory service unavailable, continuing without it");
            None
        }
    }
}

/// Orchestrator over `gateway`, configured from `config`.
///
/// # Errors
///
/// Returns `DeployError::Config` if a classifier pattern does not compile.
pub fn build_orchestrator(
    gateway: Arc<dyn WorkloadGateway>,
    config: &Config,
    sink: Arc<dyn ProgressSink>,
) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::builder(gateway)
        .configure(config)
        .map_err(DeployError::from)?
        .advisory(advisory_backend(config))
        .sink(sink)
        .build();
    Ok(orchestrator)
}
