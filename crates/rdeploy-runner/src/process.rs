use crate::error::RunnerError;
use std::time::Duration;

use super::CommandSpec;

/// Captured result of one process execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    #[must_use]
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Successful output with the given stdout, for test doubles.
    #[must_use]
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self::new(stdout.into(), Vec::new(), Some(0))
    }

    /// Failed output with the given exit code and stderr, for test doubles.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self::new(Vec::new(), stderr.into(), Some(code))
    }

    /// Stdout as UTF-8, lossy conversion.
    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Stderr as UTF-8, lossy conversion.
    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for process execution.
///
/// Implementations MUST use argv-style APIs only (no shell string evaluation)
/// and MUST enforce `timeout`, killing the child when it is exceeded.
///
/// The interface is synchronous. Async callers hop onto a blocking thread
/// (`tokio::task::spawn_blocking`) before calling it.
pub trait ProcessRunner: Send + Sync {
    /// Execute `cmd`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// * `RunnerError::SpawnFailed` if the program cannot be started
    /// * `RunnerError::Timeout` if the process exceeded `timeout` and was killed
    /// * `RunnerError::NativeExecutionFailed` for other supervision failures
    fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError>;
}
