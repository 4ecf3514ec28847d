//! Deployment results: per-phase outcomes, the abort report and the final
//! service map.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use rdeploy_utils::ExitCode;

use crate::circuit::{CircuitSnapshot, CircuitState};
use crate::classifier::ErrorReport;
use crate::probe::HealthCheckResult;
use crate::retry::RetryAttempt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseOutcome {
    Success,
    Partial,
    Aborted,
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Why a service did not become healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every start attempt failed
    StartExhausted,
    /// The start was refused by an open circuit
    CircuitOpen,
    /// The service reported an explicit negative signal
    Unhealthy,
    /// The readiness budget ran out
    HealthTimeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartExhausted => write!(f, "start attempts exhausted"),
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::HealthTimeout => write!(f, "readiness timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceOutcome {
    pub service: String,
    pub required: bool,
    /// Final readiness result. A service that never started is recorded as
    /// `Unhealthy` with `polls == 0`; `failure` tells the two cases apart.
    pub health: HealthCheckResult,
    pub attempts: Vec<RetryAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Reason given with an `unhealthy` result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub polls: u32,
}

impl ServiceOutcome {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health == HealthCheckResult::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseResult {
    pub index: usize,
    pub name: String,
    pub outcome: PhaseOutcome,
    /// Members that settled. When a required start fails, members after it
    /// were never started and started members before it were not probed;
    /// neither appears here.
    pub services: Vec<ServiceOutcome>,
    #[serde(serialize_with = "crate::serde_secs::serialize")]
    pub elapsed: Duration,
}

impl PhaseResult {
    #[must_use]
    pub fn service(&self, id: &str) -> Option<&ServiceOutcome> {
        self.services.iter().find(|s| s.service == id)
    }

    #[must_use]
    pub fn health_of(&self, id: &str) -> Option<HealthCheckResult> {
        self.service(id).map(|s| s.health)
    }
}

/// Terminal report of a fatal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortReport {
    /// Indices of phases that finished before the abort
    pub completed_phases: Vec<usize>,
    pub phase: usize,
    pub service: String,
    pub failure: FailureKind,
    pub circuit: CircuitSnapshot,
    pub error: ErrorReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalServiceState {
    pub phase: usize,
    pub health: HealthCheckResult,
    pub circuit: CircuitState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentSummary {
    pub phases_total: usize,
    pub phases_attempted: usize,
    pub phases_succeeded: usize,
    pub services_total: usize,
    pub services_healthy: usize,
    /// Runs performed, including supervised re-runs
    pub runs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReport>,
    /// Every attempted service, by id
    pub services: BTreeMap<String, FinalServiceState>,
    pub summary: DeploymentSummary,
}

impl DeploymentReport {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.is_aborted() {
            ExitCode::DEPLOY_ABORTED
        } else {
            ExitCode::SUCCESS
        }
    }

    #[must_use]
    pub fn phase(&self, index: usize) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.index == index)
    }

    /// Canonical JSON (RFC 8785).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json_canonicalizer::to_string(&value)
    }

    /// Multi-line, human-readable summary for the terminal.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for phase in &self.phases {
            let _ = writeln!(
                out,
                "Phase {} ({}): {} in {:.1}s",
                phase.index,
                phase.name,
                phase.outcome,
                phase.elapsed.as_secs_f64()
            );
            for service in &phase.services {
                let optional = if service.required { "" } else { " (optional)" };
                let _ = write!(out, "  {}{optional}: {}", service.service, service.health);
                if let Some(failure) = service.failure {
                    let _ = write!(out, " [{failure}]");
                }
                out.push('\n');
            }
        }

        if let Some(abort) = &self.abort {
            let _ = writeln!(
                out,
                "\nDeployment aborted in phase {}: {} ({})",
                abort.phase, abort.service, abort.failure
            );
            let _ = writeln!(out, "  error:   {}", abort.error.message.trim());
            let _ = writeln!(
                out,
                "  circuit: {} ({} consecutive failures)",
                abort.circuit.state, abort.circuit.consecutive_failures
            );
            let _ = writeln!(
                out,
                "  remedy:  {} [{}]",
                abort.error.remedy_or_default(),
                abort.error.source
            );
        }

        let s = &self.summary;
        let _ = write!(
            out,
            "\n{}/{} phases succeeded, {}/{} services healthy",
            s.phases_succeeded, s.phases_total, s.services_healthy, s.services_total
        );
        if s.runs > 1 {
            let _ = write!(out, " after {} runs", s.runs);
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationSource;

    fn sample() -> DeploymentReport {
        let started_at = DateTime::parse_from_rfc3339("2026-01-05T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut services = BTreeMap::new();
        services.insert(
            "mysql".to_string(),
            FinalServiceState {
                phase: 1,
                health: HealthCheckResult::Healthy,
                circuit: CircuitState::Closed,
            },
        );
        services.insert(
            "api".to_string(),
            FinalServiceState {
                phase: 2,
                health: HealthCheckResult::Timeout,
                circuit: CircuitState::Closed,
            },
        );
        DeploymentReport {
            started_at,
            finished_at: started_at,
            phases: vec![PhaseResult {
                index: 1,
                name: "infrastructure".to_string(),
                outcome: PhaseOutcome::Success,
                services: vec![ServiceOutcome {
                    service: "mysql".to_string(),
                    required: true,
                    health: HealthCheckResult::Healthy,
                    attempts: Vec::new(),
                    start_error: None,
                    failure: None,
                    detail: None,
                    polls: 2,
                }],
                elapsed: Duration::from_millis(1500),
            }],
            abort: Some(AbortReport {
                completed_phases: vec![1],
                phase: 2,
                service: "api".to_string(),
                failure: FailureKind::HealthTimeout,
                circuit: CircuitSnapshot::closed("api"),
                error: ErrorReport {
                    message: "service api timed out".to_string(),
                    remedy: String::new(),
                    source: ClassificationSource::None,
                    service: Some("api".to_string()),
                    fatal: true,
                },
            }),
            services,
            summary: DeploymentSummary {
                phases_total: 3,
                phases_attempted: 2,
                phases_succeeded: 1,
                services_total: 2,
                services_healthy: 1,
                runs: 1,
            },
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let json = sample().to_canonical_json().unwrap();
        assert!(json.starts_with("{\"abort\":"));
        assert!(json.find("\"api\"").unwrap() < json.find("\"mysql\"").unwrap());
        assert!(json.contains("\"started_at\":\"2026-01-05T10:00:00Z\""));
        assert!(json.contains("\"elapsed\":1.5"));
        assert!(json.contains("\"source\":\"none\""));
    }

    #[test]
    fn test_abort_drives_exit_code() {
        let mut report = sample();
        assert_eq!(report.exit_code(), ExitCode::DEPLOY_ABORTED);
        report.abort = None;
        assert_eq!(report.exit_code(), ExitCode::SUCCESS);
    }

    #[test]
    fn test_render_names_failure_and_fallback_remedy() {
        let text = sample().render();
        assert!(text.contains("Phase 1 (infrastructure): success"));
        assert!(text.contains("Deployment aborted in phase 2: api (readiness timeout)"));
        assert!(text.contains("remedy:  no guidance available [none]"));
        assert!(text.contains("1/3 phases succeeded"));
    }
}
