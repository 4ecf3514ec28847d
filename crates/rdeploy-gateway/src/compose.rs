use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use rdeploy_config::{GatewayConfig, ReadinessDescriptor};
use rdeploy_runner::{CommandSpec, NativeRunner, ProcessOutput, ProcessRunner, RunnerError};
use rdeploy_utils::error::GatewayError;

use crate::readiness::{exec_signal, probe_http, probe_tcp};
use crate::types::{ReadinessSignal, ServiceStatus, StartHandle, WorkloadGateway};

/// [`WorkloadGateway`] backed by `docker compose`.
///
/// Every operation is one argv-style invocation of
/// `<binary> compose [-f <file>] [-p <project>] <subcommand> ...`, executed by
/// a [`ProcessRunner`] on a blocking thread with a hard timeout.
pub struct ComposeGateway {
    config: GatewayConfig,
    runner: Arc<dyn ProcessRunner>,
    http: reqwest::Client,
    probe_timeout: Duration,
}

impl ComposeGateway {
    /// Gateway using the native process runner.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the HTTP probe client cannot be built.
    pub fn new(config: GatewayConfig, probe_timeout: Duration) -> Result<Self, GatewayError> {
        Self::with_runner(config, probe_timeout, Arc::new(NativeRunner::new()))
    }

    /// Gateway with an explicit runner (tests inject a recording runner).
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the HTTP probe client cannot be built.
    pub fn with_runner(
        config: GatewayConfig,
        probe_timeout: Duration,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable {
                reason: format!("failed to build HTTP probe client: {e}"),
            })?;
        Ok(Self {
            config,
            runner,
            http,
            probe_timeout,
        })
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout)
    }

    /// `<binary> compose [-f file] [-p project]` with the working directory applied.
    fn compose(&self) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.config.binary).arg("compose");
        if let Some(file) = &self.config.compose_file {
            cmd = cmd.arg("-f").arg(file);
        }
        if let Some(project) = &self.config.project {
            cmd = cmd.arg("-p").arg(project);
        }
        if let Some(dir) = &self.config.working_dir {
            cmd = cmd.cwd(dir);
        }
        cmd
    }

    async fn execute(
        &self,
        operation: &str,
        service: &str,
        cmd: CommandSpec,
        timeout: Duration,
    ) -> Result<ProcessOutput, GatewayError> {
        debug!(service, operation, command = %cmd, "Running runtime command");
        let runner = Arc::clone(&self.runner);
        let result = tokio::task::spawn_blocking(move || runner.run(&cmd, timeout))
            .await
            .map_err(|e| GatewayError::CommandFailed {
                operation: operation.to_string(),
                service: service.to_string(),
                code: None,
                stderr: format!("runner task failed: {e}"),
            })?;

        result.map_err(|e| map_runner_error(e, operation, service))
    }

    /// Run and require exit code 0.
    async fn execute_checked(
        &self,
        operation: &str,
        service: &str,
        cmd: CommandSpec,
        timeout: Duration,
    ) -> Result<ProcessOutput, GatewayError> {
        let output = self.execute(operation, service, cmd, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(GatewayError::CommandFailed {
                operation: operation.to_string(),
                service: service.to_string(),
                code: output.exit_code,
                stderr: output.stderr_string().trim().to_string(),
            })
        }
    }

    async fn ps_entry(&self, service: &str) -> Result<Option<ComposePsEntry>, GatewayError> {
        let cmd = self
            .compose()
            .args(["ps", "--all", "--format", "json"])
            .arg(service);
        let output = self
            .execute_checked("status", service, cmd, self.command_timeout())
            .await?;
        parse_ps_output(service, &output.stdout_string())
    }
}

#[async_trait]
impl WorkloadGateway for ComposeGateway {
    async fn start(&self, service: &str) -> Result<StartHandle, GatewayError> {
        let cmd = self.compose().args(["up", "-d", "--no-deps"]).arg(service);
        self.execute_checked("start", service, cmd, self.command_timeout())
            .await?;
        Ok(StartHandle {
            service: service.to_string(),
        })
    }

    async fn stop(&self, service: &str) -> Result<(), GatewayError> {
        let cmd = self.compose().arg("stop").arg(service);
        self.execute_checked("stop", service, cmd, self.command_timeout())
            .await?;
        Ok(())
    }

    async fn query_status(&self, service: &str) -> Result<ServiceStatus, GatewayError> {
        Ok(self
            .ps_entry(service)
            .await?
            .map_or(ServiceStatus::Unknown, |entry| entry.status()))
    }

    async fn query_readiness(
        &self,
        service: &str,
        descriptor: &ReadinessDescriptor,
    ) -> Result<ReadinessSignal, GatewayError> {
        match descriptor {
            ReadinessDescriptor::Http {
                url,
                expected_status,
            } => Ok(probe_http(&self.http, url, *expected_status, self.probe_timeout).await),
            ReadinessDescriptor::Tcp { host, port } => {
                Ok(probe_tcp(host, *port, self.probe_timeout).await)
            }
            ReadinessDescriptor::Exec {
                command,
                expect_output,
            } => {
                let cmd = self
                    .compose()
                    .args(["exec", "-T"])
                    .arg(service)
                    .args(command.iter());
                match self
                    .execute("readiness", service, cmd, self.probe_timeout)
                    .await
                {
                    Ok(output) => Ok(exec_signal(
                        output.success(),
                        &output.stdout_string(),
                        expect_output.as_deref(),
                    )),
                    Err(GatewayError::Timeout { .. }) => Ok(ReadinessSignal::NotReady),
                    Err(e) => Err(e),
                }
            }
            ReadinessDescriptor::ContainerHealth => Ok(self
                .ps_entry(service)
                .await?
                .map_or(ReadinessSignal::NotReady, |entry| entry.health_signal())),
        }
    }

    async fn recent_logs(&self, service: &str, lines: usize) -> Result<Vec<String>, GatewayError> {
        let cmd = self
            .compose()
            .args(["logs", "--no-color", "--no-log-prefix", "--tail"])
            .arg(lines.to_string())
            .arg(service);
        let output = self
            .execute_checked("logs", service, cmd, self.command_timeout())
            .await?;
        Ok(output
            .stdout_string()
            .lines()
            .map(str::to_string)
            .collect())
    }

    async fn check_available(&self) -> Result<(), GatewayError> {
        if let Err(e) = which::which(&self.config.binary) {
            warn!(binary = %self.config.binary, error = %e, "Runtime binary not found");
            return Err(GatewayError::Unavailable {
                reason: format!("'{}' not found in PATH", self.config.binary),
            });
        }
        let cmd = CommandSpec::new(&self.config.binary).args(["compose", "version"]);
        match self
            .execute_checked("version", "compose", cmd, self.command_timeout())
            .await
        {
            Ok(_) => Ok(()),
            Err(GatewayError::Unavailable { reason }) => Err(GatewayError::Unavailable { reason }),
            Err(other) => Err(GatewayError::Unavailable {
                reason: other.raw_message(),
            }),
        }
    }
}

fn map_runner_error(err: RunnerError, operation: &str, service: &str) -> GatewayError {
    match err {
        RunnerError::SpawnFailed { program, reason } => GatewayError::Unavailable {
            reason: format!("cannot execute '{program}': {reason}"),
        },
        RunnerError::Timeout { timeout_seconds } => GatewayError::Timeout {
            operation: operation.to_string(),
            service: service.to_string(),
            timeout_secs: timeout_seconds,
        },
        RunnerError::NativeExecutionFailed { reason } => GatewayError::CommandFailed {
            operation: operation.to_string(),
            service: service.to_string(),
            code: None,
            stderr: reason,
        },
    }
}

/// One row of `docker compose ps --format json`.
#[derive(Debug, Clone, Deserialize)]
struct ComposePsEntry {
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Health", default)]
    health: String,
}

impl ComposePsEntry {
    fn status(&self) -> ServiceStatus {
        match self.state.to_ascii_lowercase().as_str() {
            "running" => ServiceStatus::Running,
            "exited" | "dead" => ServiceStatus::Exited,
            _ => ServiceStatus::Unknown,
        }
    }

    /// Readiness from the runtime healthcheck. A running container without a
    /// healthcheck reports an empty `Health` and counts as ready.
    fn health_signal(&self) -> ReadinessSignal {
        match self.health.to_ascii_lowercase().as_str() {
            "healthy" => ReadinessSignal::Ready,
            "unhealthy" => {
                ReadinessSignal::Failed("container healthcheck reports unhealthy".to_string())
            }
            "" if self.status() == ServiceStatus::Running => ReadinessSignal::Ready,
            _ => ReadinessSignal::NotReady,
        }
    }
}

/// Compose v2 prints either one JSON array or one JSON object per line,
/// depending on version. Both are accepted.
fn parse_ps_output(service: &str, stdout: &str) -> Result<Option<ComposePsEntry>, GatewayError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parse_err = |e: serde_json::Error| GatewayError::Parse {
        service: service.to_string(),
        reason: e.to_string(),
    };

    let entries: Vec<ComposePsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(parse_err)?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(parse_err))
            .collect::<Result<_, _>>()?
    };

    // Prefer the row for the requested service; scaled services report several.
    let mut matching = entries
        .iter()
        .filter(|e| e.service.is_empty() || e.service == service);
    let chosen = matching
        .clone()
        .find(|e| e.status() == ServiceStatus::Running)
        .or_else(|| matching.next())
        .cloned();
    Ok(chosen)
}
