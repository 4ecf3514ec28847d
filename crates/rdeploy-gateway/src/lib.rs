//! Workload gateway abstraction
//!
//! The orchestrator never talks to a container runtime directly; it goes
//! through [`WorkloadGateway`]. [`ComposeGateway`] is the production
//! implementation on top of `docker compose`.

mod compose;
mod readiness;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

pub use compose::ComposeGateway;
pub use types::{ReadinessSignal, ServiceStatus, StartHandle, WorkloadGateway};

pub use rdeploy_config::ReadinessDescriptor;
pub use rdeploy_utils::error::GatewayError;
