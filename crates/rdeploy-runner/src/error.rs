//! Error types for process execution

use thiserror::Error;

/// Failures launching or supervising a child process.
///
/// A process that runs and exits non-zero is not an error at this level; the
/// caller inspects [`ProcessOutput`](crate::ProcessOutput) for that.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Native execution failed: {reason}")]
    NativeExecutionFailed { reason: String },

    #[error("Execution timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },
}

impl RunnerError {
    /// True when the program could not be started at all (missing binary,
    /// permissions). Callers treat this as "runtime unavailable".
    #[must_use]
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailed { .. })
    }
}
