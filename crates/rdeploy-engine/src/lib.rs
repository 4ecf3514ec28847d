//! Deployment engine for rdeploy
//!
//! The [`Orchestrator`] walks an ordered list of [`Phase`](rdeploy_config::Phase)s.
//! Every start goes through a per-service [`CircuitBreaker`] wrapped around a
//! [`RetryController`]; readiness is decided by [`HealthProbe`]; a fatal
//! failure is explained by the [`ErrorClassifier`], locally when a pattern
//! matches and through the advisory service otherwise.
//!
//! All timed waits go through [`rdeploy_utils::Clock`], so tests drive the
//! engine with a manual clock instead of real sleeps.

pub mod circuit;
pub mod classifier;
pub mod probe;
pub mod progress;
pub mod report;
pub mod retry;
pub mod scheduler;
mod serde_secs;

pub use circuit::{
    CircuitBreaker, CircuitBreakerRegistry, CircuitError, CircuitOpenRejection, CircuitSnapshot,
    CircuitState,
};
pub use classifier::{
    ClassificationSource, ErrorClassifier, ErrorReport, FailureContext, NO_GUIDANCE, PatternRule,
};
pub use probe::{HealthCheckResult, HealthProbe, HealthWatch};
pub use progress::{DeployEvent, NoopSink, ProgressSink, RecordingSink, TracingSink};
pub use report::{
    AbortReport, DeploymentReport, DeploymentSummary, FailureKind, FinalServiceState,
    PhaseOutcome, PhaseResult, ServiceOutcome,
};
pub use retry::{
    AttemptOutcome, FixedJitter, JitterSource, RandomJitter, RetryAttempt, RetryController,
    RetryPolicy,
};
pub use scheduler::{
    Orchestrator, OrchestratorBuilder, OrchestratorSettings, ServiceStatusReport, StopReport,
};
