//! Phased, readiness-gated deployment.
//!
//! For each phase in order the [`Orchestrator`] issues a start for every
//! member (circuit breaker around retry around `WorkloadGateway::start`),
//! then probes each started member until it is healthy, unhealthy or out of
//! time. A required member that does not become healthy aborts the run and
//! is classified; an optional one only downgrades the phase to `partial`.
//! Phase *k+1* never begins before phase *k* has resolved.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, warn};

use rdeploy_advisory::AdvisoryBackend;
use rdeploy_config::{Config, Phase, ServiceSpec};
use rdeploy_gateway::{ServiceStatus, StartHandle, WorkloadGateway};
use rdeploy_utils::error::{ConfigError, GatewayError, StartError};
use rdeploy_utils::logging::{log_abort, log_phase_complete, phase_span};
use rdeploy_utils::{Clock, SystemClock};

use crate::circuit::{CircuitBreakerRegistry, CircuitError};
use crate::classifier::{ErrorClassifier, FailureContext};
use crate::probe::{HealthCheckResult, HealthProbe};
use crate::progress::{DeployEvent, NoopSink, ProgressSink};
use crate::report::{
    AbortReport, DeploymentReport, DeploymentSummary, FailureKind, FinalServiceState, PhaseOutcome,
    PhaseResult, ServiceOutcome,
};
use crate::retry::{JitterSource, RandomJitter, RetryAttempt, RetryController, RetryPolicy};

/// Timing knobs of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    /// Bound on one gateway start call
    pub start_timeout: Duration,
    /// Bound on one status or readiness query
    pub probe_timeout: Duration,
    /// Bound on stop and log calls
    pub command_timeout: Duration,
    pub advisory_timeout: Duration,
    /// Log lines attached to an escalation
    pub context_lines: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.defaults.poll_interval(),
            start_timeout: config.defaults.start_timeout(),
            probe_timeout: config.defaults.probe_timeout(),
            command_timeout: Duration::from_secs(config.gateway.command_timeout),
            advisory_timeout: config.advisory.timeout(),
            context_lines: config.advisory.context_lines,
        }
    }
}

/// Builds an [`Orchestrator`]; every collaborator but the gateway has a default.
pub struct OrchestratorBuilder {
    gateway: Arc<dyn WorkloadGateway>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    retry_policy: RetryPolicy,
    circuit_threshold: u32,
    circuit_cooldown: Duration,
    classifier: ErrorClassifier,
    advisory: Option<Arc<dyn AdvisoryBackend>>,
    sink: Arc<dyn ProgressSink>,
    settings: OrchestratorSettings,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn new(gateway: Arc<dyn WorkloadGateway>) -> Self {
        let config = Config::default();
        Self {
            gateway,
            clock: Arc::new(SystemClock::new()),
            jitter: Arc::new(RandomJitter),
            retry_policy: RetryPolicy::from(&config.retry),
            circuit_threshold: config.circuit.threshold,
            circuit_cooldown: Duration::from_secs(config.circuit.cooldown),
            classifier: ErrorClassifier::default(),
            advisory: None,
            sink: Arc::new(NoopSink),
            settings: OrchestratorSettings::from_config(&config),
        }
    }

    /// Take retry, circuit, timing and classifier settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a classifier pattern is invalid.
    pub fn configure(mut self, config: &Config) -> Result<Self, ConfigError> {
        self.retry_policy = RetryPolicy::from(&config.retry);
        self.circuit_threshold = config.circuit.threshold;
        self.circuit_cooldown = Duration::from_secs(config.circuit.cooldown);
        self.classifier = ErrorClassifier::from_config(&config.classifier)?;
        self.settings = OrchestratorSettings::from_config(config);
        Ok(self)
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn circuit(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.circuit_threshold = threshold;
        self.circuit_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Escalate unmatched failures to `backend`, bounded by `settings.advisory_timeout`.
    #[must_use]
    pub fn advisory(mut self, backend: Option<Arc<dyn AdvisoryBackend>>) -> Self {
        self.advisory = backend;
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let classifier = match self.advisory {
            Some(backend) => self
                .classifier
                .with_advisory(backend, self.settings.advisory_timeout),
            None => self.classifier,
        };
        Orchestrator {
            circuits: CircuitBreakerRegistry::new(
                self.circuit_threshold,
                self.circuit_cooldown,
                Arc::clone(&self.clock),
            ),
            retry: RetryController::new(self.retry_policy, self.jitter, Arc::clone(&self.clock)),
            probe: HealthProbe::new(
                Arc::clone(&self.gateway),
                Arc::clone(&self.clock),
                self.settings.probe_timeout,
            ),
            gateway: self.gateway,
            clock: self.clock,
            classifier,
            sink: self.sink,
            settings: self.settings,
        }
    }
}

/// Status of one configured service, for `rdeploy status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatusReport {
    pub service: String,
    pub phase: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a stop sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Services stopped, in stop order
    pub stopped: Vec<String>,
    /// `(service, error)` for every stop that failed
    pub failed: Vec<(String, String)>,
}

impl StopReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A member of a phase once its start and readiness have resolved.
struct Settled {
    outcome: ServiceOutcome,
    start_error: Option<StartError>,
    /// Readiness budget the service was given
    budget: Duration,
}

/// The deployment driver. Owns the circuit memory shared by every run.
pub struct Orchestrator {
    gateway: Arc<dyn WorkloadGateway>,
    clock: Arc<dyn Clock>,
    circuits: CircuitBreakerRegistry,
    retry: RetryController,
    probe: HealthProbe,
    classifier: ErrorClassifier,
    sink: Arc<dyn ProgressSink>,
    settings: OrchestratorSettings,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("circuits", &self.circuits)
            .field("retry", &self.retry)
            .field("classifier", &self.classifier)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn builder(gateway: Arc<dyn WorkloadGateway>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(gateway)
    }

    #[must_use]
    pub fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.circuits
    }

    #[must_use]
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Run every phase in order, stopping at the first aborted phase.
    pub async fn run(&self, phases: &[Phase]) -> DeploymentReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(phases.len());
        let mut completed = Vec::new();
        let mut abort = None;

        for phase in phases {
            let span = phase_span(phase.index, &phase.name);
            let (result, phase_abort) = self.run_phase(phase, &completed).instrument(span).await;
            results.push(result);
            if phase_abort.is_some() {
                abort = phase_abort;
                break;
            }
            completed.push(phase.index);
        }

        let services = self.final_services(&results).await;
        let summary = DeploymentSummary {
            phases_total: phases.len(),
            phases_attempted: results.len(),
            phases_succeeded: results
                .iter()
                .filter(|r| r.outcome == PhaseOutcome::Success)
                .count(),
            services_total: services.len(),
            services_healthy: services
                .values()
                .filter(|s| s.health == HealthCheckResult::Healthy)
                .count(),
            runs: 1,
        };

        DeploymentReport {
            started_at,
            finished_at: Utc::now(),
            phases: results,
            abort,
            services,
            summary,
        }
    }

    /// [`run`](Self::run), then re-run the whole plan after an abort up to
    /// `reruns` more times, waiting `interval` between runs.
    ///
    /// Circuit memory carries across runs, so a habitually failing service
    /// ends up rejected without being started. Returns the last run's report.
    pub async fn run_supervised(
        &self,
        phases: &[Phase],
        reruns: u32,
        interval: Duration,
    ) -> DeploymentReport {
        let mut report = self.run(phases).await;
        let started_at = report.started_at;
        let mut runs = 1;

        while report.is_aborted() && runs <= reruns {
            info!(
                run = runs + 1,
                remaining = reruns + 1 - runs,
                interval_secs = interval.as_secs(),
                "Deployment aborted, scheduling re-run"
            );
            self.clock.sleep(interval).await;
            runs += 1;
            report = self.run(phases).await;
        }

        report.started_at = started_at;
        report.summary.runs = runs;
        report
    }

    async fn run_phase(&self, phase: &Phase, completed: &[usize]) -> (PhaseResult, Option<AbortReport>) {
        let phase_started = self.clock.now();
        self.sink.on_event(&DeployEvent::PhaseStarted {
            index: phase.index,
            name: phase.name.clone(),
            services: phase.services.len(),
        });

        // A required member that cannot be started decides the phase: later
        // members are not started and started ones are not probed.
        let mut starts = Vec::with_capacity(phase.services.len());
        let mut start_aborted = false;
        for spec in &phase.services {
            let start = self.start_service(spec).await;
            start_aborted = spec.required && start.is_err();
            starts.push((spec, start));
            if start_aborted {
                break;
            }
        }
        if start_aborted {
            let not_started = phase.services.len() - starts.len();
            info!(
                phase = phase.index,
                not_started,
                "Required start failed, skipping readiness checks"
            );
        }

        // The phase budget starts once every start has been issued
        let deadline = self.clock.now() + phase.max_wait;
        let mut settled = Vec::with_capacity(starts.len());
        for (spec, start) in starts {
            let item = match start {
                Ok(_) if start_aborted => {
                    debug!(service = %spec.id, "Started but left unprobed");
                    continue;
                }
                Ok(attempts) => self.await_healthy(spec, deadline, attempts).await,
                Err((error, attempts)) => start_failed(spec, error, attempts),
            };
            self.sink.on_event(&DeployEvent::ServiceSettled {
                service: spec.id.clone(),
                result: item.outcome.health,
                required: spec.required,
            });
            settled.push(item);
        }

        let fatal = settled
            .iter()
            .position(|s| s.outcome.required && !s.outcome.is_healthy());
        let outcome = if fatal.is_some() {
            PhaseOutcome::Aborted
        } else if settled.iter().any(|s| !s.outcome.is_healthy()) {
            for s in settled.iter().filter(|s| !s.outcome.is_healthy()) {
                warn!(
                    service = %s.outcome.service,
                    result = %s.outcome.health,
                    "Optional service did not become healthy, continuing"
                );
            }
            PhaseOutcome::Partial
        } else {
            PhaseOutcome::Success
        };

        let abort = match fatal {
            Some(position) => Some(self.abort_report(phase, completed, &settled[position]).await),
            None => None,
        };

        let elapsed = self.clock.now().saturating_sub(phase_started);
        log_phase_complete(phase.index, &phase.name, &outcome.to_string(), elapsed.as_millis());
        self.sink.on_event(&DeployEvent::PhaseFinished {
            index: phase.index,
            name: phase.name.clone(),
            outcome,
            elapsed,
        });

        let result = PhaseResult {
            index: phase.index,
            name: phase.name.clone(),
            outcome,
            services: settled.into_iter().map(|s| s.outcome).collect(),
            elapsed,
        };
        (result, abort)
    }

    /// Circuit(Retry(start)). A rejected call never reaches the gateway.
    async fn start_service(
        &self,
        spec: &ServiceSpec,
    ) -> Result<Vec<RetryAttempt>, (StartError, Vec<RetryAttempt>)> {
        let id = spec.id.as_str();
        let result = self
            .circuits
            .execute(id, || async {
                self.retry
                    .retry(id, |attempt| {
                        self.sink.on_event(&DeployEvent::StartAttempt {
                            service: id.to_string(),
                            attempt,
                        });
                        self.start_once(id)
                    })
                    .await
                    .into_result()
            })
            .await;

        let (error, attempts) = match result {
            Ok((_handle, attempts)) => {
                self.sink.on_event(&DeployEvent::ServiceStarted {
                    service: id.to_string(),
                    attempts: u32::try_from(attempts.len()).unwrap_or(u32::MAX),
                });
                return Ok(attempts);
            }
            Err(CircuitError::Failed(exhausted)) => (
                StartError::RetriesExhausted {
                    service: id.to_string(),
                    attempts: u32::try_from(exhausted.history.len()).unwrap_or(u32::MAX),
                    last_error: exhausted.last_error,
                },
                exhausted.history,
            ),
            Err(CircuitError::Rejected(rejection)) => (
                StartError::CircuitOpen {
                    service: id.to_string(),
                    consecutive_failures: rejection.consecutive_failures,
                    retry_in_secs: rejection.retry_in.as_secs(),
                },
                Vec::new(),
            ),
        };

        warn!(service = id, error = %error, "Service could not be started");
        self.sink.on_event(&DeployEvent::StartFailed {
            service: id.to_string(),
            reason: error.to_string(),
        });
        Err((error, attempts))
    }

    async fn start_once(&self, id: &str) -> Result<StartHandle, GatewayError> {
        match tokio::time::timeout(self.settings.start_timeout, self.gateway.start(id)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                operation: "start".to_string(),
                service: id.to_string(),
                timeout_secs: self.settings.start_timeout.as_secs(),
            }),
        }
    }

    /// Probe `spec` within `min(startup_timeout, time left in the phase)`.
    async fn await_healthy(
        &self,
        spec: &ServiceSpec,
        deadline: Duration,
        attempts: Vec<RetryAttempt>,
    ) -> Settled {
        let remaining = deadline.saturating_sub(self.clock.now());
        let budget = spec.startup_timeout.min(remaining);
        debug!(
            service = %spec.id,
            budget_secs = budget.as_secs(),
            probe = ?spec.readiness,
            "Waiting for readiness"
        );

        let mut watch = self
            .probe
            .watch_service(spec, self.settings.poll_interval, budget);
        let mut health = HealthCheckResult::Timeout;
        while let Some(result) = watch.next().await {
            self.sink.on_event(&DeployEvent::HealthPoll {
                service: spec.id.clone(),
                poll: watch.polls(),
                result,
            });
            health = result;
        }

        let failure = match health {
            HealthCheckResult::Healthy => None,
            HealthCheckResult::Unhealthy => Some(FailureKind::Unhealthy),
            HealthCheckResult::Timeout | HealthCheckResult::Starting => {
                Some(FailureKind::HealthTimeout)
            }
        };

        Settled {
            outcome: ServiceOutcome {
                service: spec.id.clone(),
                required: spec.required,
                health,
                attempts,
                start_error: None,
                failure,
                detail: watch.detail().map(str::to_string),
                polls: watch.polls(),
            },
            start_error: None,
            budget,
        }
    }

    async fn abort_report(&self, phase: &Phase, completed: &[usize], failed: &Settled) -> AbortReport {
        let service = failed.outcome.service.as_str();
        let message = failure_message(failed);

        let mut context = FailureContext {
            service: Some(service.to_string()),
            phase: Some((phase.index, phase.name.clone())),
            attempts: failed.outcome.attempts.clone(),
            recent_logs: Vec::new(),
        };
        if self.classifier.has_advisory() && self.classifier.match_remedy(&message).is_none() {
            context.recent_logs = self.recent_logs(service).await;
        }

        let mut error = self.classifier.classify(&message, &context).await;
        error.fatal = true;

        log_abort(phase.index, service, error.remedy_or_default());
        self.sink.on_event(&DeployEvent::Aborted {
            phase: phase.index,
            service: service.to_string(),
            remedy: error.remedy.clone(),
        });

        AbortReport {
            completed_phases: completed.to_vec(),
            phase: phase.index,
            service: service.to_string(),
            failure: failed.outcome.failure.unwrap_or(FailureKind::HealthTimeout),
            circuit: self.circuits.snapshot(service).await,
            error,
        }
    }

    /// Best effort; failures yield no lines.
    async fn recent_logs(&self, service: &str) -> Vec<String> {
        if self.settings.context_lines == 0 {
            return Vec::new();
        }
        match tokio::time::timeout(
            self.settings.command_timeout,
            self.gateway.recent_logs(service, self.settings.context_lines),
        )
        .await
        {
            Ok(Ok(lines)) => lines,
            Ok(Err(e)) => {
                debug!(service, error = %e, "Could not fetch recent logs");
                Vec::new()
            }
            Err(_) => {
                debug!(service, "Timed out fetching recent logs");
                Vec::new()
            }
        }
    }

    async fn final_services(&self, results: &[PhaseResult]) -> BTreeMap<String, FinalServiceState> {
        let mut services = BTreeMap::new();
        for phase in results {
            for outcome in &phase.services {
                let circuit = self.circuits.snapshot(&outcome.service).await.state;
                services.insert(
                    outcome.service.clone(),
                    FinalServiceState {
                        phase: phase.index,
                        health: outcome.health,
                        circuit,
                    },
                );
            }
        }
        services
    }

    /// Stop every service, last phase first. Failures are collected, never fatal.
    pub async fn stop_all(&self, phases: &[Phase]) -> StopReport {
        let mut report = StopReport::default();
        for phase in phases.iter().rev() {
            for spec in phase.services.iter().rev() {
                let id = spec.id.as_str();
                let outcome =
                    tokio::time::timeout(self.settings.command_timeout, self.gateway.stop(id)).await;
                match outcome {
                    Ok(Ok(())) => {
                        info!(service = id, phase = phase.index, "Service stopped");
                        report.stopped.push(id.to_string());
                    }
                    Ok(Err(e)) => {
                        warn!(service = id, error = %e, "Stop failed, continuing");
                        report.failed.push((id.to_string(), e.to_string()));
                    }
                    Err(_) => {
                        let timeout_secs = self.settings.command_timeout.as_secs();
                        warn!(service = id, timeout_secs, "Stop timed out, continuing");
                        report
                            .failed
                            .push((id.to_string(), format!("stop timed out after {timeout_secs}s")));
                    }
                }
            }
        }
        report
    }

    /// Query status, and readiness for running services, without orchestrating.
    pub async fn status(&self, phases: &[Phase]) -> Vec<ServiceStatusReport> {
        let mut reports = Vec::new();
        for phase in phases {
            for spec in &phase.services {
                reports.push(self.service_status(spec).await);
            }
        }
        reports
    }

    async fn service_status(&self, spec: &ServiceSpec) -> ServiceStatusReport {
        let mut report = ServiceStatusReport {
            service: spec.id.clone(),
            phase: spec.phase,
            status: None,
            readiness: None,
            error: None,
        };

        let bound = self.settings.probe_timeout;
        match tokio::time::timeout(bound, self.gateway.query_status(&spec.id)).await {
            Ok(Ok(status)) => report.status = Some(status),
            Ok(Err(e)) => {
                report.error = Some(e.to_string());
                return report;
            }
            Err(_) => {
                report.error = Some(format!("status query timed out after {}s", bound.as_secs()));
                return report;
            }
        }

        if report.status == Some(ServiceStatus::Running) {
            if let Some(descriptor) = &spec.readiness {
                match tokio::time::timeout(bound, self.gateway.query_readiness(&spec.id, descriptor))
                    .await
                {
                    Ok(Ok(signal)) => report.readiness = Some(signal.to_string()),
                    Ok(Err(e)) => report.error = Some(e.to_string()),
                    Err(_) => {
                        report.error =
                            Some(format!("readiness query timed out after {}s", bound.as_secs()));
                    }
                }
            }
        }
        report
    }
}

fn start_failed(spec: &ServiceSpec, error: StartError, attempts: Vec<RetryAttempt>) -> Settled {
    let failure = match error {
        StartError::RetriesExhausted { .. } => FailureKind::StartExhausted,
        StartError::CircuitOpen { .. } => FailureKind::CircuitOpen,
    };
    Settled {
        outcome: ServiceOutcome {
            service: spec.id.clone(),
            required: spec.required,
            health: HealthCheckResult::Unhealthy,
            attempts,
            start_error: Some(error.to_string()),
            failure: Some(failure),
            detail: None,
            polls: 0,
        },
        start_error: Some(error),
        budget: Duration::ZERO,
    }
}

/// Message handed to the classifier for a service that failed.
fn failure_message(failed: &Settled) -> String {
    let service = &failed.outcome.service;
    if let Some(error) = &failed.start_error {
        return error.raw_message();
    }
    match failed.outcome.health {
        HealthCheckResult::Unhealthy => match &failed.outcome.detail {
            Some(detail) => format!("service {service} is unhealthy: {detail}"),
            None => format!("service {service} is unhealthy"),
        },
        _ => format!(
            "service {service} did not report ready within {}s",
            failed.budget.as_secs()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FixedJitter;
    use rdeploy_gateway::scripted::ScriptedGateway;
    use rdeploy_utils::test_support::ManualClock;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn orchestrator(gateway: &Arc<ScriptedGateway>, clock: &Arc<ManualClock>) -> Orchestrator {
        Orchestrator::builder(gateway.clone())
            .clock(clock.clone())
            .jitter(Arc::new(FixedJitter::none()))
            .retry_policy(RetryPolicy::new(3, secs(1), 2.0, secs(60)))
            .build()
    }

    #[tokio::test]
    async fn test_optional_failure_makes_phase_partial() {
        let gateway = Arc::new(
            ScriptedGateway::new().always_fail_start("metrics", "image not found"),
        );
        let clock = Arc::new(ManualClock::new());
        let phases = vec![
            Phase::new(1, "infrastructure", secs(60))
                .with_service(ServiceSpec::new("mysql", 1))
                .with_service(ServiceSpec::new("metrics", 1).optional()),
            Phase::new(2, "application", secs(60)).with_service(ServiceSpec::new("api", 2)),
        ];

        let report = orchestrator(&gateway, &clock).run(&phases).await;

        assert!(!report.is_aborted());
        assert_eq!(report.phases[0].outcome, PhaseOutcome::Partial);
        assert_eq!(report.phases[1].outcome, PhaseOutcome::Success);
        let metrics = report.phases[0].service("metrics").unwrap();
        assert_eq!(metrics.health, HealthCheckResult::Unhealthy);
        assert_eq!(metrics.failure, Some(FailureKind::StartExhausted));
        assert_eq!(metrics.polls, 0);
        assert!(metrics.start_error.as_deref().unwrap().contains("3 attempts"));
        assert_eq!(report.summary.services_healthy, 2);
        assert_eq!(report.summary.phases_succeeded, 1);
    }

    #[test]
    fn test_unhealthy_message_carries_probe_detail() {
        let settled = Settled {
            outcome: ServiceOutcome {
                service: "api".to_string(),
                required: true,
                health: HealthCheckResult::Unhealthy,
                attempts: Vec::new(),
                start_error: None,
                failure: Some(FailureKind::Unhealthy),
                detail: Some("HTTP 500".to_string()),
                polls: 1,
            },
            start_error: None,
            budget: secs(30),
        };
        assert_eq!(failure_message(&settled), "service api is unhealthy: HTTP 500");
    }

    #[tokio::test]
    async fn test_stop_all_runs_in_reverse_order() {
        let gateway = Arc::new(ScriptedGateway::new());
        let clock = Arc::new(ManualClock::new());
        let phases = vec![
            Phase::new(1, "infrastructure", secs(60))
                .with_service(ServiceSpec::new("mysql", 1))
                .with_service(ServiceSpec::new("redis", 1)),
            Phase::new(2, "application", secs(60)).with_service(ServiceSpec::new("api", 2)),
        ];

        let report = orchestrator(&gateway, &clock).stop_all(&phases).await;

        assert!(report.is_clean());
        assert_eq!(report.stopped, vec!["api", "redis", "mysql"]);
    }

    #[tokio::test]
    async fn test_status_reports_readiness_only_when_running() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .statuses("mysql", &[ServiceStatus::Running])
                .statuses("redis", &[ServiceStatus::Exited]),
        );
        let clock = Arc::new(ManualClock::new());
        let phases = vec![
            Phase::new(1, "infrastructure", secs(60))
                .with_service(
                    ServiceSpec::new("mysql", 1)
                        .with_readiness(rdeploy_config::ReadinessDescriptor::ContainerHealth),
                )
                .with_service(
                    ServiceSpec::new("redis", 1)
                        .with_readiness(rdeploy_config::ReadinessDescriptor::ContainerHealth),
                ),
        ];

        let statuses = orchestrator(&gateway, &clock).status(&phases).await;

        assert_eq!(statuses[0].status, Some(ServiceStatus::Running));
        assert_eq!(statuses[0].readiness.as_deref(), Some("ready"));
        assert_eq!(statuses[1].status, Some(ServiceStatus::Exited));
        assert_eq!(statuses[1].readiness, None);
        assert!(!gateway.touched("api"));
    }
}
