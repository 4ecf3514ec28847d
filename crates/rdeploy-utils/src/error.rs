use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `DeployError` is the error type returned by rdeploy library operations that
/// can fail outright (configuration loading, gateway construction, report
/// writing). A deployment that runs to completion but aborts on a required
/// service is *not* an error: it is reported through the deployment report.
///
/// # Exit Code Mapping
///
/// Use [`to_exit_code()`](Self::to_exit_code) to map errors to CLI exit codes:
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration/CLI argument errors |
/// | 3 | Deployment aborted |
/// | 4 | Gateway unavailable |
/// | 130 | Interrupted |
/// | 1 | Other errors |
///
/// Library code returns `DeployError` and does NOT call `std::process::exit()`.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Advisory error: {0}")]
    Advisory(#[from] AdvisoryError),

    #[error("Start error: {0}")]
    Start(#[from] StartError),

    #[error("Deployment aborted in phase {phase} on service {service}")]
    Aborted { phase: usize, service: String },

    #[error("Deployment interrupted")]
    Interrupted,

    #[error("Report write failed at {path}: {reason}")]
    ReportWriteFailed { path: String, reason: String },
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Gateway,
    Advisory,
    Orchestration,
    FileSystem,
    Interrupted,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Gateway => write!(f, "Workload Gateway"),
            Self::Advisory => write!(f, "Advisory Service"),
            Self::Orchestration => write!(f, "Orchestration"),
            Self::FileSystem => write!(f, "File System"),
            Self::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::MissingRequired(key) => {
                format!("Required configuration '{key}' is missing")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {path}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [defaults], [retry], [circuit] and [[phases]] sections."
                    .to_string(),
            ),
            Self::MissingRequired(_) => Some(
                "A deployment plan needs at least one phase with at least one service.".to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::NotFound { .. } => Some(
                "rdeploy searches for .rdeploy/config.toml starting from the current directory upward."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Compare with the example configuration in the documentation".to_string(),
            ],
            Self::MissingRequired(key) => vec![
                format!("Add '{key}' to .rdeploy/config.toml"),
                "Declare phases with [[phases]] and services with [[phases.services]]".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "retry.max_attempts" | "circuit.threshold" => {
                    vec!["Use a positive integer value".to_string()]
                }
                "retry.multiplier" => vec!["Use a multiplier of at least 1.0".to_string()],
                _ => vec![
                    "Check the documentation for valid values for this option".to_string(),
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Create .rdeploy/config.toml in your project root".to_string(),
                "Use --config <path> to specify the configuration file explicitly".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Failures reported by a workload gateway (the container/process manager).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The runtime itself cannot be reached or executed
    #[error("Workload runtime unavailable: {reason}")]
    Unavailable { reason: String },

    /// A runtime command ran and reported failure
    #[error("{operation} failed for {service} (exit code {code:?}): {stderr}")]
    CommandFailed {
        operation: String,
        service: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A runtime command exceeded its time bound
    #[error("{operation} for {service} timed out after {timeout_secs} seconds")]
    Timeout {
        operation: String,
        service: String,
        timeout_secs: u64,
    },

    /// Runtime output could not be interpreted
    #[error("Unreadable runtime output for {service}: {reason}")]
    Parse { service: String, reason: String },
}

impl GatewayError {
    /// Raw text suitable for error classification.
    #[must_use]
    pub fn raw_message(&self) -> String {
        match self {
            Self::CommandFailed { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.trim().to_string()
            }
            other => other.to_string(),
        }
    }
}

impl UserFriendlyError for GatewayError {
    fn user_message(&self) -> String {
        match self {
            Self::Unavailable { reason } => format!("The container runtime is unavailable: {reason}"),
            Self::CommandFailed {
                operation, service, ..
            } => format!("Could not {operation} service '{service}'"),
            Self::Timeout {
                operation,
                service,
                timeout_secs,
            } => format!("{operation} of '{service}' did not finish within {timeout_secs}s"),
            Self::Parse { service, reason } => {
                format!("Could not read runtime state for '{service}': {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::CommandFailed { stderr, .. } if !stderr.is_empty() => {
                Some(format!("Runtime output: {stderr}"))
            }
            Self::Unavailable { .. } => Some(
                "rdeploy drives services through the configured container runtime binary."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Unavailable { .. } => vec![
                "Check that the runtime binary is installed and in PATH".to_string(),
                "Ensure the runtime daemon is running".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase [defaults].start_timeout or [gateway].command_timeout".to_string(),
            ],
            _ => vec!["Run with --verbose to see the runtime commands being issued".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Gateway
    }
}

/// Why a service could not be started.
///
/// Individual failed attempts are transient and absorbed by retries; only
/// the outcome of the whole start sequence surfaces here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// Every attempt failed; `last_error` is the final attempt's failure
    #[error("{service} did not start after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        service: String,
        attempts: u32,
        last_error: GatewayError,
    },

    /// The service's circuit is open and the start was not attempted
    #[error(
        "circuit for {service} is open after {consecutive_failures} consecutive failures; next trial in {retry_in_secs}s"
    )]
    CircuitOpen {
        service: String,
        consecutive_failures: u32,
        retry_in_secs: u64,
    },
}

impl StartError {
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::RetriesExhausted { service, .. } | Self::CircuitOpen { service, .. } => service,
        }
    }

    /// Raw text suitable for error classification.
    #[must_use]
    pub fn raw_message(&self) -> String {
        match self {
            Self::RetriesExhausted { last_error, .. } => last_error.raw_message(),
            other => other.to_string(),
        }
    }
}

impl UserFriendlyError for StartError {
    fn user_message(&self) -> String {
        match self {
            Self::RetriesExhausted {
                service, attempts, ..
            } => format!("Service '{service}' failed to start after {attempts} attempts"),
            Self::CircuitOpen { service, .. } => {
                format!("Service '{service}' keeps failing; its start was skipped")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::RetriesExhausted { last_error, .. } => {
                Some(format!("Last failure: {}", last_error.raw_message()))
            }
            Self::CircuitOpen { retry_in_secs, .. } => Some(format!(
                "Starts are refused for another {retry_in_secs}s after repeated failures"
            )),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::RetriesExhausted { .. } => vec![
                "Inspect the service logs with 'docker compose logs <service>'".to_string(),
                "Raise [retry].max_attempts if the failure is intermittent".to_string(),
            ],
            Self::CircuitOpen { .. } => vec![
                "Fix the underlying failure, then wait for [circuit].cooldown to pass".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Orchestration
    }
}

/// Failures of the advisory text-completion service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvisoryError {
    /// Transport-level failure (HTTP connectivity)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Provider answered without usable text
    #[error("Empty advisory response")]
    EmptyResponse,

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

impl UserFriendlyError for AdvisoryError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Advisory transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("Advisory authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("Advisory quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Advisory service outage: {msg}"),
            Self::Timeout { duration } => format!("Advisory request timed out after {duration:?}"),
            Self::EmptyResponse => "Advisory service returned no guidance".to_string(),
            Self::Misconfiguration(msg) => format!("Advisory configuration error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "The advisory service is only consulted for failures no local pattern recognises; \
             deployments never fail because of it."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => vec![
                "Check that the environment variable named by [advisory].api_key_env is set"
                    .to_string(),
                "Set [advisory].enabled = false to skip escalation entirely".to_string(),
            ],
            Self::Timeout { .. } => vec!["Increase [advisory].timeout".to_string()],
            _ => vec!["Wait a few minutes and try again".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Advisory
    }
}

impl UserFriendlyError for DeployError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.user_message(),
            Self::Gateway(err) => err.user_message(),
            Self::Advisory(err) => err.user_message(),
            Self::Start(err) => err.user_message(),
            Self::Aborted { phase, service } => {
                format!("Deployment stopped at phase {phase}: required service '{service}' failed")
            }
            Self::Interrupted => "Deployment interrupted; started services were left running".to_string(),
            Self::ReportWriteFailed { path, reason } => {
                format!("Could not write deployment report to {path}: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(err) => err.context(),
            Self::Gateway(err) => err.context(),
            Self::Advisory(err) => err.context(),
            Self::Start(err) => err.context(),
            Self::Interrupted => Some("No rollback is performed on interrupt.".to_string()),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(err) => err.suggestions(),
            Self::Gateway(err) => err.suggestions(),
            Self::Advisory(err) => err.suggestions(),
            Self::Start(err) => err.suggestions(),
            Self::Interrupted => vec!["Run 'rdeploy down' to stop partially started services".to_string()],
            Self::Aborted { .. } => vec![
                "Inspect the failing service's logs".to_string(),
                "Re-run with --reruns to retry the plan".to_string(),
            ],
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Gateway(_) => ErrorCategory::Gateway,
            Self::Advisory(_) => ErrorCategory::Advisory,
            Self::ReportWriteFailed { .. } => ErrorCategory::FileSystem,
            Self::Start(_) | Self::Aborted { .. } => ErrorCategory::Orchestration,
            Self::Interrupted => ErrorCategory::Interrupted,
        }
    }
}

impl DeployError {
    /// Render the error with context and suggestions for terminal output.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("error[{}]: {}", self.category(), self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n  context: {context}"));
        }
        for suggestion in self.suggestions() {
            out.push_str(&format!("\n  hint: {suggestion}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_deploy_error() {
        let err: DeployError = ConfigError::MissingRequired("phases".to_string()).into();
        assert!(matches!(err, DeployError::Config(_)));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("phases"));
    }

    #[test]
    fn test_gateway_raw_message_prefers_stderr() {
        let err = GatewayError::CommandFailed {
            operation: "start".to_string(),
            service: "mysql".to_string(),
            code: Some(1),
            stderr: "  Bind for 0.0.0.0:3306 failed: port is already allocated\n".to_string(),
        };
        assert_eq!(
            err.raw_message(),
            "Bind for 0.0.0.0:3306 failed: port is already allocated"
        );

        let timeout = GatewayError::Timeout {
            operation: "start".to_string(),
            service: "mysql".to_string(),
            timeout_secs: 30,
        };
        assert!(timeout.raw_message().contains("timed out"));
    }

    #[test]
    fn test_start_error_classifies_on_runtime_output() {
        let exhausted = StartError::RetriesExhausted {
            service: "api".to_string(),
            attempts: 3,
            last_error: GatewayError::CommandFailed {
                operation: "start".to_string(),
                service: "api".to_string(),
                code: Some(1),
                stderr: "pull access denied for platform/api\n".to_string(),
            },
        };
        assert_eq!(exhausted.raw_message(), "pull access denied for platform/api");
        assert_eq!(exhausted.service(), "api");

        let open = StartError::CircuitOpen {
            service: "api".to_string(),
            consecutive_failures: 5,
            retry_in_secs: 42,
        };
        assert!(open.raw_message().contains("circuit for api is open"));
        let err: DeployError = open.into();
        assert_eq!(err.category(), ErrorCategory::Orchestration);
    }

    #[test]
    fn test_display_for_user_includes_hints() {
        let err = DeployError::Interrupted;
        let rendered = err.display_for_user();
        assert!(rendered.contains("Interrupted"));
        assert!(rendered.contains("rdeploy down"));
    }

    #[test]
    fn test_advisory_errors_are_advisory_category() {
        let errors = [
            AdvisoryError::Transport("x".to_string()),
            AdvisoryError::EmptyResponse,
            AdvisoryError::Timeout {
                duration: Duration::from_secs(3),
            },
        ];
        for err in errors {
            assert_eq!(err.category(), ErrorCategory::Advisory);
            assert!(!err.suggestions().is_empty());
        }
    }
}
