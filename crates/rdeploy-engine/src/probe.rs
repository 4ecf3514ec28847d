//! Readiness polling.
//!
//! [`HealthProbe::watch`] returns a [`HealthWatch`]: a lazy, finite,
//! non-restartable sequence with one [`HealthCheckResult`] per poll. It ends
//! on the first `healthy` or `unhealthy`, or yields `timeout` once the
//! deadline passes. All waiting goes through the injected [`Clock`].

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use rdeploy_config::{ReadinessDescriptor, ServiceSpec};
use rdeploy_gateway::{ReadinessSignal, ServiceStatus, WorkloadGateway};
use rdeploy_utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckResult {
    Starting,
    Healthy,
    Unhealthy,
    Timeout,
}

impl HealthCheckResult {
    /// True for every value that ends a watch.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Starting)
    }
}

impl fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Polls services through a gateway.
#[derive(Clone)]
pub struct HealthProbe {
    gateway: Arc<dyn WorkloadGateway>,
    clock: Arc<dyn Clock>,
    /// Upper bound on a single status or readiness query
    query_timeout: Duration,
}

impl fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthProbe")
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl HealthProbe {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn WorkloadGateway>,
        clock: Arc<dyn Clock>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            clock,
            query_timeout,
        }
    }

    /// Start watching `service`, polling every `interval` for at most `max_wait`.
    #[must_use]
    pub fn watch(
        &self,
        service: &str,
        descriptor: Option<&ReadinessDescriptor>,
        interval: Duration,
        max_wait: Duration,
    ) -> HealthWatch {
        HealthWatch {
            probe: self.clone(),
            service: service.to_string(),
            descriptor: descriptor.cloned(),
            interval,
            deadline: self.clock.now() + max_wait,
            polls: 0,
            finished: false,
            last_detail: None,
        }
    }

    /// [`watch`](Self::watch) using the service's own descriptor.
    #[must_use]
    pub fn watch_service(&self, spec: &ServiceSpec, interval: Duration, max_wait: Duration) -> HealthWatch {
        self.watch(&spec.id, spec.readiness.as_ref(), interval, max_wait)
    }

    /// One poll: status first, then readiness once running.
    ///
    /// Query errors and query timeouts are transient and count as `starting`.
    /// The second element carries a reason for `unhealthy`.
    async fn poll_once(
        &self,
        service: &str,
        descriptor: Option<&ReadinessDescriptor>,
    ) -> (HealthCheckResult, Option<String>) {
        let status =
            match tokio::time::timeout(self.query_timeout, self.gateway.query_status(service)).await
            {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    warn!(service, error = %e, "Status query failed, treating as starting");
                    return (HealthCheckResult::Starting, None);
                }
                Err(_) => {
                    warn!(
                        service,
                        timeout_secs = self.query_timeout.as_secs(),
                        "Status query timed out, treating as starting"
                    );
                    return (HealthCheckResult::Starting, None);
                }
            };

        match status {
            ServiceStatus::Exited => {
                return (
                    HealthCheckResult::Unhealthy,
                    Some("container exited".to_string()),
                );
            }
            ServiceStatus::Unknown => return (HealthCheckResult::Starting, None),
            ServiceStatus::Running => {}
        }

        let Some(descriptor) = descriptor else {
            return (HealthCheckResult::Healthy, None);
        };

        match tokio::time::timeout(
            self.query_timeout,
            self.gateway.query_readiness(service, descriptor),
        )
        .await
        {
            Ok(Ok(ReadinessSignal::Ready)) => (HealthCheckResult::Healthy, None),
            Ok(Ok(ReadinessSignal::NotReady)) => (HealthCheckResult::Starting, None),
            Ok(Ok(ReadinessSignal::Failed(reason))) => (HealthCheckResult::Unhealthy, Some(reason)),
            Ok(Err(e)) => {
                warn!(service, probe = %descriptor, error = %e, "Readiness query failed, treating as starting");
                (HealthCheckResult::Starting, None)
            }
            Err(_) => {
                warn!(
                    service,
                    probe = %descriptor,
                    timeout_secs = self.query_timeout.as_secs(),
                    "Readiness query timed out, treating as starting"
                );
                (HealthCheckResult::Starting, None)
            }
        }
    }
}

/// A bounded sequence of polls for one service.
#[derive(Debug)]
pub struct HealthWatch {
    probe: HealthProbe,
    service: String,
    descriptor: Option<ReadinessDescriptor>,
    interval: Duration,
    deadline: Duration,
    polls: u32,
    finished: bool,
    last_detail: Option<String>,
}

impl HealthWatch {
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Polls issued so far.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Reason reported with an `unhealthy` result, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.last_detail.as_deref()
    }

    /// Next element, or `None` once a terminal result has been yielded.
    ///
    /// Every poll after the first is preceded by a sleep of `interval`,
    /// clamped so it never overshoots the deadline. Reaching the deadline
    /// yields `timeout` without another poll.
    pub async fn next(&mut self) -> Option<HealthCheckResult> {
        if self.finished {
            return None;
        }

        if self.polls > 0 {
            let remaining = self.deadline.saturating_sub(self.probe.clock.now());
            self.probe.clock.sleep(self.interval.min(remaining)).await;
        }

        if self.probe.clock.now() >= self.deadline {
            self.finished = true;
            debug!(service = %self.service, polls = self.polls, "Readiness deadline reached");
            return Some(HealthCheckResult::Timeout);
        }

        self.polls += 1;
        let (result, detail) = self
            .probe
            .poll_once(&self.service, self.descriptor.as_ref())
            .await;
        debug!(service = %self.service, poll = self.polls, result = %result, "Readiness poll");

        if result.is_terminal() {
            self.finished = true;
            self.last_detail = detail;
        }
        Some(result)
    }

    /// Drain the watch and return its terminal result.
    pub async fn settle(&mut self) -> HealthCheckResult {
        let mut last = HealthCheckResult::Timeout;
        while let Some(result) = self.next().await {
            last = result;
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdeploy_gateway::scripted::ScriptedGateway;
    use rdeploy_utils::error::GatewayError;
    use rdeploy_utils::test_support::ManualClock;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn probe(gateway: ScriptedGateway, clock: &Arc<ManualClock>) -> HealthProbe {
        HealthProbe::new(Arc::new(gateway), clock.clone(), secs(10))
    }

    async fn collect(watch: &mut HealthWatch) -> Vec<HealthCheckResult> {
        let mut results = Vec::new();
        while let Some(result) = watch.next().await {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn test_never_ready_times_out_at_deadline() {
        let clock = Arc::new(ManualClock::new());
        let gateway = ScriptedGateway::new()
            .statuses("api", &[ServiceStatus::Running])
            .readiness("api", &[ReadinessSignal::NotReady]);
        let probe = probe(gateway, &clock);

        let mut watch = probe.watch("api", Some(&ReadinessDescriptor::ContainerHealth), secs(5), secs(30));
        let results = collect(&mut watch).await;

        assert_eq!(results.len(), 7);
        assert!(results[..6].iter().all(|r| *r == HealthCheckResult::Starting));
        assert_eq!(results[6], HealthCheckResult::Timeout);
        assert_eq!(watch.polls(), 6);
        assert_eq!(clock.now(), secs(30));
        assert_eq!(watch.next().await, None);
    }

    #[tokio::test]
    async fn test_last_sleep_is_clamped_to_deadline() {
        let clock = Arc::new(ManualClock::new());
        let gateway = ScriptedGateway::new().statuses("api", &[ServiceStatus::Unknown]);
        let probe = probe(gateway, &clock);

        let mut watch = probe.watch("api", None, secs(5), secs(12));
        assert_eq!(watch.settle().await, HealthCheckResult::Timeout);
        assert_eq!(clock.sleeps(), vec![secs(5), secs(5), secs(2)]);
    }

    #[tokio::test]
    async fn test_running_without_descriptor_is_healthy_immediately() {
        let clock = Arc::new(ManualClock::new());
        let gateway = ScriptedGateway::new().statuses("redis", &[ServiceStatus::Running]);
        let probe = probe(gateway, &clock);

        let mut watch = probe.watch("redis", None, secs(5), secs(30));
        assert_eq!(collect(&mut watch).await, vec![HealthCheckResult::Healthy]);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_becomes_healthy_after_not_ready_polls() {
        let clock = Arc::new(ManualClock::new());
        let gateway = ScriptedGateway::new()
            .statuses("api", &[ServiceStatus::Unknown, ServiceStatus::Running])
            .readiness("api", &[ReadinessSignal::NotReady, ReadinessSignal::Ready]);
        let probe = probe(gateway, &clock);

        let descriptor = ReadinessDescriptor::Tcp {
            host: "localhost".to_string(),
            port: 8080,
        };
        let mut watch = probe.watch("api", Some(&descriptor), secs(5), secs(60));
        assert_eq!(
            collect(&mut watch).await,
            vec![
                HealthCheckResult::Starting,
                HealthCheckResult::Starting,
                HealthCheckResult::Healthy
            ]
        );
        assert_eq!(clock.now(), secs(10));
    }

    #[tokio::test]
    async fn test_failed_signal_is_unhealthy_and_terminal() {
        let clock = Arc::new(ManualClock::new());
        let gateway = ScriptedGateway::new()
            .statuses("api", &[ServiceStatus::Running])
            .readiness("api", &[ReadinessSignal::Failed("status 500".to_string())]);
        let probe = probe(gateway, &clock);

        let mut watch = probe.watch("api", Some(&ReadinessDescriptor::ContainerHealth), secs(5), secs(60));
        assert_eq!(collect(&mut watch).await, vec![HealthCheckResult::Unhealthy]);
        assert_eq!(watch.detail(), Some("status 500"));
    }

    #[tokio::test]
    async fn test_exited_is_unhealthy() {
        let clock = Arc::new(ManualClock::new());
        let gateway = ScriptedGateway::new().statuses("mysql", &[ServiceStatus::Exited]);
        let probe = probe(gateway, &clock);

        let mut watch = probe.watch("mysql", None, secs(5), secs(60));
        assert_eq!(watch.settle().await, HealthCheckResult::Unhealthy);
        assert_eq!(watch.detail(), Some("container exited"));
    }

    #[tokio::test]
    async fn test_query_errors_are_transient() {
        let clock = Arc::new(ManualClock::new());
        let gateway = ScriptedGateway::new().status_error(
            "api",
            GatewayError::Parse {
                service: "api".to_string(),
                reason: "bad json".to_string(),
            },
        );
        let probe = probe(gateway, &clock);

        let mut watch = probe.watch("api", None, secs(5), secs(10));
        assert_eq!(
            collect(&mut watch).await,
            vec![
                HealthCheckResult::Starting,
                HealthCheckResult::Starting,
                HealthCheckResult::Timeout
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_budget_times_out_without_polling() {
        let clock = Arc::new(ManualClock::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let probe = HealthProbe::new(gateway.clone(), clock.clone(), secs(10));

        let mut watch = probe.watch("api", None, secs(5), Duration::ZERO);
        assert_eq!(watch.settle().await, HealthCheckResult::Timeout);
        assert!(!gateway.touched("api"));
    }
}
