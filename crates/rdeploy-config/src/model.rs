use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::plan::ReadinessDescriptor;

/// Resolved configuration for rdeploy operations.
///
/// Every section is filled: values missing from the file fall back to the
/// built-in defaults, and CLI flags override both.
///
/// # Example
///
/// ```rust,no_run
/// use rdeploy_config::{CliArgs, Config};
///
/// let config = Config::discover(&CliArgs::default())?;
/// let phases = config.plan()?;
/// println!("{} phases, retry up to {} times", phases.len(), config.retry.max_attempts);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub defaults: Defaults,
    pub retry: RetrySettings,
    pub circuit: CircuitSettings,
    pub gateway: GatewayConfig,
    pub advisory: AdvisoryConfig,
    pub classifier: ClassifierConfig,
    pub phases: Vec<PhaseConfig>,
    /// File the configuration was loaded from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Timing defaults, all in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    /// Interval between readiness polls
    pub poll_interval: u64,
    /// Per-service readiness budget when a service sets none
    pub startup_timeout: u64,
    /// Upper bound on one gateway start call
    pub start_timeout: u64,
    /// Upper bound on one readiness query
    pub probe_timeout: u64,
    /// Phase max-wait when a phase sets none
    pub phase_max_wait: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            poll_interval: 5,
            startup_timeout: 120,
            start_timeout: 300,
            probe_timeout: 10,
            phase_max_wait: 300,
        }
    }
}

impl Defaults {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

/// Backoff parameters for gateway starts. Delays are in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay: f64,
    pub multiplier: f64,
    pub max_delay: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: 1.0,
            multiplier: 2.0,
            max_delay: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitSettings {
    /// Consecutive failures that open a circuit
    pub threshold: u32,
    /// Seconds an open circuit rejects calls before allowing a trial
    pub cooldown: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: 60,
        }
    }
}

/// How the container runtime is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Runtime binary; `compose` is passed as its first argument
    pub binary: String,
    pub compose_file: Option<PathBuf>,
    pub project: Option<String>,
    /// Directory commands run in; defaults to the directory holding the config file
    pub working_dir: Option<PathBuf>,
    /// Upper bound on stop/ps/logs commands, in seconds
    pub command_timeout: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            compose_file: None,
            project: None,
            working_dir: None,
            command_timeout: 300,
        }
    }
}

/// External advisory service used when no local pattern matches a failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub enabled: bool,
    /// OpenAI-compatible chat-completions URL
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key (never the key itself)
    pub api_key_env: String,
    /// Seconds
    pub timeout: u64,
    /// Recent service log lines included with an escalation
    pub context_lines: usize,
    pub max_tokens: u32,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "RDEPLOY_ADVISORY_API_KEY".to_string(),
            timeout: 30,
            context_lines: 20,
            max_tokens: 400,
        }
    }
}

impl AdvisoryConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Extra patterns, consulted before the built-in table
    pub patterns: Vec<PatternConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    Substring,
    Keywords,
    Regex,
}

/// One `[[classifier.patterns]]` entry.
///
/// `substring` and `regex` read `pattern`; `keywords` reads `keywords` and
/// matches only when every keyword is present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatternConfig {
    pub kind: MatcherKind,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub remedy: String,
}

/// One `[[phases]]` entry, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhaseConfig {
    pub name: String,
    /// Seconds; falls back to `defaults.phase_max_wait`
    #[serde(default)]
    pub max_wait: Option<u64>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// One `[[phases.services]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub id: String,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Seconds; falls back to `defaults.startup_timeout`
    #[serde(default)]
    pub startup_timeout: Option<u64>,
    #[serde(default)]
    pub readiness: Option<ReadinessDescriptor>,
}

fn default_required() -> bool {
    true
}

/// Overrides collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub poll_interval: Option<u64>,
    pub max_attempts: Option<u32>,
    pub circuit_threshold: Option<u32>,
    pub circuit_cooldown: Option<u64>,
    pub gateway_binary: Option<String>,
    pub compose_file: Option<PathBuf>,
    pub project: Option<String>,
    pub no_advisory: bool,
}
