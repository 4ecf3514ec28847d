use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use rdeploy_config::ReadinessDescriptor;
use rdeploy_utils::error::GatewayError;

/// Lifecycle state reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Exited,
    Unknown,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Answer to one readiness query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessSignal {
    Ready,
    /// Not ready yet; worth polling again
    NotReady,
    /// Explicitly broken; polling again will not help
    Failed(String),
}

impl fmt::Display for ReadinessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::NotReady => write!(f, "not-ready"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartHandle {
    pub service: String,
}

/// Operations the orchestrator needs from a container/process manager.
///
/// Implementations must bound every call in time; the engine adds its own
/// outer bound on `start` and `query_readiness` as well.
#[async_trait]
pub trait WorkloadGateway: Send + Sync {
    async fn start(&self, service: &str) -> Result<StartHandle, GatewayError>;

    async fn stop(&self, service: &str) -> Result<(), GatewayError>;

    async fn query_status(&self, service: &str) -> Result<ServiceStatus, GatewayError>;

    async fn query_readiness(
        &self,
        service: &str,
        descriptor: &ReadinessDescriptor,
    ) -> Result<ReadinessSignal, GatewayError>;

    /// Most recent log lines, oldest first. Best effort.
    async fn recent_logs(&self, _service: &str, _lines: usize) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    /// Fail with `GatewayError::Unavailable` when the runtime cannot be driven at all.
    async fn check_available(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
