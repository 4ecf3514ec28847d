use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use rdeploy_utils::error::ConfigError;

use crate::model::Config;

/// How a service's readiness is observed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReadinessDescriptor {
    /// GET `url` and compare the status code
    Http {
        url: String,
        #[serde(default = "default_expected_status")]
        expected_status: u16,
    },
    /// Open a TCP connection
    Tcp { host: String, port: u16 },
    /// Run `command` inside the service container; exit 0 means ready
    Exec {
        command: Vec<String>,
        /// When set, stdout must also contain this text (e.g. `PONG`)
        #[serde(default)]
        expect_output: Option<String>,
    },
    /// Trust the runtime's own healthcheck status
    ContainerHealth,
}

fn default_expected_status() -> u16 {
    200
}

impl fmt::Display for ReadinessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                url,
                expected_status,
            } => write!(f, "http {url} (expect {expected_status})"),
            Self::Tcp { host, port } => write!(f, "tcp {host}:{port}"),
            Self::Exec { command, .. } => write!(f, "exec {}", command.join(" ")),
            Self::ContainerHealth => write!(f, "container-health"),
        }
    }
}

/// An immutable service entry of the deployment plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub id: String,
    /// 1-based index of the owning phase
    pub phase: usize,
    /// `None` means "running = ready"
    pub readiness: Option<ReadinessDescriptor>,
    pub startup_timeout: Duration,
    pub required: bool,
}

impl ServiceSpec {
    /// Required service with no readiness descriptor.
    #[must_use]
    pub fn new(id: impl Into<String>, phase: usize) -> Self {
        Self {
            id: id.into(),
            phase,
            readiness: None,
            startup_timeout: Duration::from_secs(120),
            required: true,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessDescriptor) -> Self {
        self.readiness = Some(readiness);
        self
    }

    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

/// An immutable, ordered phase of the deployment plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    /// 1-based position in the plan
    pub index: usize,
    pub name: String,
    pub services: Vec<ServiceSpec>,
    pub max_wait: Duration,
}

impl Phase {
    #[must_use]
    pub fn new(index: usize, name: impl Into<String>, max_wait: Duration) -> Self {
        Self {
            index,
            name: name.into(),
            services: Vec::new(),
            max_wait,
        }
    }

    /// Append a service, stamping it with this phase's index.
    #[must_use]
    pub fn with_service(mut self, mut service: ServiceSpec) -> Self {
        service.phase = self.index;
        self.services.push(service);
        self
    }
}

impl Config {
    /// Build the deployment plan from `[[phases]]`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when no phase (or no service)
    /// is configured, and `ConfigError::InvalidValue` for duplicate ids.
    pub fn plan(&self) -> Result<Vec<Phase>, ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::MissingRequired("phases".to_string()));
        }

        let mut seen = HashSet::new();
        let mut plan = Vec::with_capacity(self.phases.len());

        for (offset, phase_cfg) in self.phases.iter().enumerate() {
            let index = offset + 1;
            if phase_cfg.services.is_empty() {
                return Err(ConfigError::MissingRequired(format!(
                    "phases[{}].services",
                    phase_cfg.name
                )));
            }

            let max_wait = phase_cfg.max_wait.unwrap_or(self.defaults.phase_max_wait);
            let mut phase = Phase::new(index, phase_cfg.name.clone(), Duration::from_secs(max_wait));

            for service in &phase_cfg.services {
                if !seen.insert(service.id.clone()) {
                    return Err(ConfigError::InvalidValue {
                        key: "phases.services.id".to_string(),
                        value: format!("'{}' is declared more than once", service.id),
                    });
                }
                let startup_timeout = service
                    .startup_timeout
                    .unwrap_or(self.defaults.startup_timeout);
                phase = phase.with_service(ServiceSpec {
                    id: service.id.clone(),
                    phase: index,
                    readiness: service.readiness.clone(),
                    startup_timeout: Duration::from_secs(startup_timeout),
                    required: service.required,
                });
            }

            plan.push(phase);
        }

        Ok(plan)
    }
}
