//! Progress events emitted while a deployment runs.
//!
//! Sinks observe the run; they cannot influence it.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

use crate::probe::HealthCheckResult;
use crate::report::PhaseOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployEvent {
    PhaseStarted {
        index: usize,
        name: String,
        services: usize,
    },
    StartAttempt {
        service: String,
        attempt: u32,
    },
    ServiceStarted {
        service: String,
        attempts: u32,
    },
    StartFailed {
        service: String,
        reason: String,
    },
    HealthPoll {
        service: String,
        poll: u32,
        result: HealthCheckResult,
    },
    ServiceSettled {
        service: String,
        result: HealthCheckResult,
        required: bool,
    },
    PhaseFinished {
        index: usize,
        name: String,
        outcome: PhaseOutcome,
        #[serde(serialize_with = "crate::serde_secs::serialize")]
        elapsed: Duration,
    },
    Aborted {
        phase: usize,
        service: String,
        remedy: String,
    },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &DeployEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&DeployEvent) + Send + Sync,
{
    fn on_event(&self, event: &DeployEvent) {
        self(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_event(&self, _event: &DeployEvent) {}
}

/// Renders the milestones of a run as `info` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_event(&self, event: &DeployEvent) {
        match event {
            DeployEvent::PhaseStarted {
                index,
                name,
                services,
            } => info!(phase = index, name = %name, services, "Phase started"),
            DeployEvent::ServiceStarted { service, attempts } => {
                info!(service = %service, attempts, "Service started");
            }
            DeployEvent::ServiceSettled {
                service,
                result,
                required,
            } => info!(service = %service, result = %result, required, "Service settled"),
            DeployEvent::StartAttempt { .. }
            | DeployEvent::StartFailed { .. }
            | DeployEvent::HealthPoll { .. }
            | DeployEvent::PhaseFinished { .. }
            | DeployEvent::Aborted { .. } => {}
        }
    }
}

/// Keeps every event, for tests and `--json` consumers.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DeployEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<DeployEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_event(&self, event: &DeployEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
