//! In-memory gateway for tests.
//!
//! Each service follows a small script: how many starts fail (or whether all
//! do), then the sequence of statuses and readiness answers to report. The
//! last scripted value repeats forever. Every call is recorded in order.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rdeploy_config::ReadinessDescriptor;
use rdeploy_utils::error::GatewayError;

use crate::types::{ReadinessSignal, ServiceStatus, StartHandle, WorkloadGateway};

/// One recorded gateway interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Start(String),
    Stop(String),
    Status(String),
    Readiness(String),
    Logs(String),
}

impl GatewayCall {
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::Start(s) | Self::Stop(s) | Self::Status(s) | Self::Readiness(s) | Self::Logs(s) => s,
        }
    }
}

#[derive(Debug, Default)]
struct ServiceScript {
    start_failures: VecDeque<GatewayError>,
    always_fail_start: Option<GatewayError>,
    statuses: VecDeque<ServiceStatus>,
    readiness: VecDeque<ReadinessSignal>,
    status_error: Option<GatewayError>,
    logs: Vec<String>,
    started: bool,
}

fn next_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// Scripted [`WorkloadGateway`].
///
/// Defaults for an unscripted service: starts succeed, status is `running`
/// once started (`unknown` before), readiness is `ready`.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, ServiceScript>>,
    calls: Mutex<Vec<GatewayCall>>,
    unavailable: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, service: &str, edit: impl FnOnce(&mut ServiceScript)) {
        let mut scripts = lock(&self.scripts);
        edit(scripts.entry(service.to_string()).or_default());
    }

    /// The next `count` starts of `service` fail with `stderr`.
    #[must_use]
    pub fn fail_starts(self, service: &str, count: usize, stderr: &str) -> Self {
        self.script(service, |s| {
            for _ in 0..count {
                s.start_failures.push_back(start_error(service, stderr));
            }
        });
        self
    }

    /// Every start of `service` fails with `stderr`.
    #[must_use]
    pub fn always_fail_start(self, service: &str, stderr: &str) -> Self {
        self.script(service, |s| s.always_fail_start = Some(start_error(service, stderr)));
        self
    }

    /// Statuses reported in order; the last one repeats.
    #[must_use]
    pub fn statuses(self, service: &str, statuses: &[ServiceStatus]) -> Self {
        self.script(service, |s| s.statuses = statuses.iter().copied().collect());
        self
    }

    /// Readiness answers in order; the last one repeats.
    #[must_use]
    pub fn readiness(self, service: &str, signals: &[ReadinessSignal]) -> Self {
        self.script(service, |s| s.readiness = signals.iter().cloned().collect());
        self
    }

    /// Every status query of `service` fails.
    #[must_use]
    pub fn status_error(self, service: &str, error: GatewayError) -> Self {
        self.script(service, |s| s.status_error = Some(error));
        self
    }

    #[must_use]
    pub fn logs(self, service: &str, lines: &[&str]) -> Self {
        self.script(service, |s| s.logs = lines.iter().map(|l| (*l).to_string()).collect());
        self
    }

    /// `check_available` fails with `reason`.
    #[must_use]
    pub fn unavailable(self, reason: &str) -> Self {
        *lock(&self.unavailable) = Some(reason.to_string());
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    /// Number of start calls issued for `service`.
    #[must_use]
    pub fn start_count(&self, service: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, GatewayCall::Start(s) if s == service))
            .count()
    }

    /// True if any call at all was made for `service`.
    #[must_use]
    pub fn touched(&self, service: &str) -> bool {
        lock(&self.calls).iter().any(|c| c.service() == service)
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.calls).push(call);
    }
}

fn start_error(service: &str, stderr: &str) -> GatewayError {
    GatewayError::CommandFailed {
        operation: "start".to_string(),
        service: service.to_string(),
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl WorkloadGateway for ScriptedGateway {
    async fn start(&self, service: &str) -> Result<StartHandle, GatewayError> {
        self.record(GatewayCall::Start(service.to_string()));
        let mut scripts = lock(&self.scripts);
        let script = scripts.entry(service.to_string()).or_default();
        if let Some(err) = &script.always_fail_start {
            return Err(err.clone());
        }
        if let Some(err) = script.start_failures.pop_front() {
            return Err(err);
        }
        script.started = true;
        Ok(StartHandle {
            service: service.to_string(),
        })
    }

    async fn stop(&self, service: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::Stop(service.to_string()));
        if let Some(script) = lock(&self.scripts).get_mut(service) {
            script.started = false;
        }
        Ok(())
    }

    async fn query_status(&self, service: &str) -> Result<ServiceStatus, GatewayError> {
        self.record(GatewayCall::Status(service.to_string()));
        let mut scripts = lock(&self.scripts);
        let script = scripts.entry(service.to_string()).or_default();
        if let Some(err) = &script.status_error {
            return Err(err.clone());
        }
        Ok(next_sticky(&mut script.statuses).unwrap_or(if script.started {
            ServiceStatus::Running
        } else {
            ServiceStatus::Unknown
        }))
    }

    async fn query_readiness(
        &self,
        service: &str,
        _descriptor: &ReadinessDescriptor,
    ) -> Result<ReadinessSignal, GatewayError> {
        self.record(GatewayCall::Readiness(service.to_string()));
        let mut scripts = lock(&self.scripts);
        let script = scripts.entry(service.to_string()).or_default();
        Ok(next_sticky(&mut script.readiness).unwrap_or(ReadinessSignal::Ready))
    }

    async fn recent_logs(&self, service: &str, lines: usize) -> Result<Vec<String>, GatewayError> {
        self.record(GatewayCall::Logs(service.to_string()));
        let scripts = lock(&self.scripts);
        let logs = scripts.get(service).map(|s| s.logs.clone()).unwrap_or_default();
        let skip = logs.len().saturating_sub(lines);
        Ok(logs.into_iter().skip(skip).collect())
    }

    async fn check_available(&self) -> Result<(), GatewayError> {
        match lock(&self.unavailable).clone() {
            Some(reason) => Err(GatewayError::Unavailable { reason }),
            None => Ok(()),
        }
    }
}
