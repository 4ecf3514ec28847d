use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use rdeploy_utils::error::ConfigError;

use crate::model::{CliArgs, Config};
use crate::{CONFIG_DIR, CONFIG_FILE};

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is given in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// Path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        let mut config = match &config_path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                let mut loaded = Self::load_config_file(path)
                    .with_context(|| format!("Failed to load config file: {}", path.display()))?;
                if loaded.gateway.working_dir.is_none() {
                    loaded.gateway.working_dir = project_root_for(path);
                }
                loaded.source_path = Some(path.clone());
                loaded
            }
            None => {
                debug!(start = %start_dir.display(), "No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Discover config file by searching upward from a given directory
    ///
    /// Walks up the directory tree looking for `.rdeploy/config.toml`, stopping
    /// at repository root markers (.git, .hg, .svn) or filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = Some(start_dir);

        while let Some(dir) = current_dir {
            let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }

            current_dir = dir.parent();
        }

        None
    }

    /// Parse a configuration document without touching the filesystem.
    ///
    /// The result is not validated; call [`Config::validate`] for that.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFile` when the TOML is malformed or has
    /// fields of the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFile(e.to_string()))
    }

    fn load_config_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Ok(Self::from_toml_str(&content)?)
    }

    fn apply_cli_overrides(&mut self, cli_args: &CliArgs) {
        if let Some(poll_interval) = cli_args.poll_interval {
            self.defaults.poll_interval = poll_interval;
        }
        if let Some(max_attempts) = cli_args.max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(threshold) = cli_args.circuit_threshold {
            self.circuit.threshold = threshold;
        }
        if let Some(cooldown) = cli_args.circuit_cooldown {
            self.circuit.cooldown = cooldown;
        }
        if let Some(binary) = &cli_args.gateway_binary {
            self.gateway.binary = binary.clone();
        }
        if let Some(compose_file) = &cli_args.compose_file {
            self.gateway.compose_file = Some(compose_file.clone());
        }
        if let Some(project) = &cli_args.project {
            self.gateway.project = Some(project.clone());
        }
        if cli_args.no_advisory {
            self.advisory.enabled = false;
        }
    }
}

/// `<root>/.rdeploy/config.toml` -> `<root>`
fn project_root_for(config_path: &Path) -> Option<PathBuf> {
    let dir = config_path.parent()?;
    if dir.file_name().is_some_and(|name| name == CONFIG_DIR) {
        dir.parent().map(Path::to_path_buf)
    } else {
        Some(dir.to_path_buf())
    }
}
