//! rdeploy - Phased, readiness-gated service deployment
//!
//! rdeploy brings up a multi-service stack in ordered phases. Every service of
//! a phase is started (with retries behind a per-service circuit breaker) and
//! probed until it is ready before the next phase begins. When a required
//! service cannot be brought up, the deployment aborts with a report naming
//! the service, its circuit state and a remedy: from a local pattern list
//! when one matches, otherwise from an optional advisory service.
//!
//! rdeploy can be used in two ways:
//! - **CLI**: `rdeploy deploy`, `rdeploy down`, `rdeploy status`, `rdeploy classify`
//! - **Library**: build an [`Orchestrator`] over any [`WorkloadGateway`]
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Deploy the plan in .rdeploy/config.toml
//! rdeploy deploy
//!
//! # Deploy, re-running up to twice after an abort, and keep a JSON report
//! rdeploy deploy --reruns 2 --rerun-interval 30 --report deploy-report.json
//!
//! # What is running right now?
//! rdeploy status --json
//!
//! # Explain an error message
//! rdeploy classify "Bind for 0.0.0.0:3306 failed: port is already allocated"
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rdeploy::{ComposeGateway, Config, CliArgs, Orchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::discover(&CliArgs::default())?;
//! let gateway = Arc::new(ComposeGateway::new(
//!     config.gateway.clone(),
//!     config.defaults.probe_timeout(),
//! )?);
//! let orchestrator = Orchestrator::builder(gateway).configure(&config)?.build();
//! let report = orchestrator.run(&config.plan()?).await;
//! println!("{}", report.render());
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Output
//!
//! Reports and status snapshots are emitted as canonical JSON (RFC 8785) so
//! they diff cleanly between runs. Use [`emit_jcs`] for your own integrations.

pub mod cli;

use anyhow::{Context, Result};
use serde::Serialize;

/// Configuration for rdeploy operations.
///
/// `Config` provides hierarchical configuration with discovery and precedence:
/// CLI arguments > config file > built-in defaults. [`Config::plan()`] turns
/// the `[[phases]]` tables into the phases the orchestrator runs.
pub use rdeploy_config::Config;

/// CLI argument structure for configuration override.
pub use rdeploy_config::CliArgs;

/// The immutable deployment plan.
pub use rdeploy_config::{Phase, ReadinessDescriptor, ServiceSpec};

/// Library-level error type with rich context.
///
/// Library code returns `DeployError` and does NOT call `std::process::exit()`.
pub use rdeploy_utils::error::DeployError;

/// Exit codes matching the documented exit code table.
pub use rdeploy_utils::exit_codes::ExitCode;

/// Error categories for grouping similar errors.
pub use rdeploy_utils::error::ErrorCategory;

/// Trait for providing user-friendly error reporting.
pub use rdeploy_utils::error::UserFriendlyError;

/// The workload gateway seam and its `docker compose` implementation.
pub use rdeploy_gateway::{ComposeGateway, ReadinessSignal, ServiceStatus, WorkloadGateway};

/// The deployment engine.
pub use rdeploy_engine::{
    DeploymentReport, ErrorClassifier, ErrorReport, HealthCheckResult, Orchestrator,
    OrchestratorBuilder, PhaseOutcome, ProgressSink,
};

/// Serialize `value` as canonical JSON (RFC 8785).
///
/// # Errors
///
/// Returns an error if `value` cannot be represented as JSON.
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).context("Failed to serialize value to JSON")?;
    serde_json_canonicalizer::to_string(&value).context("Failed to canonicalize JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_jcs_sorts_keys() {
        #[derive(Serialize)]
        struct Sample {
            zeta: u32,
            alpha: &'static str,
        }
        let json = emit_jcs(&Sample {
            zeta: 1,
            alpha: "a",
        })
        .unwrap();
        assert_eq!(json, r#"{"alpha":"a","zeta":1}"#);
    }
}
