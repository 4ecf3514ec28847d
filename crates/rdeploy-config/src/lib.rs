//! Configuration management for rdeploy
//!
//! Hierarchical configuration with discovery and precedence: CLI > file >
//! defaults. The file is TOML with `[defaults]`, `[retry]`, `[circuit]`,
//! `[gateway]`, `[advisory]`, `[[classifier.patterns]]` and `[[phases]]`
//! sections. [`Config::plan`] turns the `[[phases]]` tables into the immutable
//! [`Phase`]/[`ServiceSpec`] values the engine runs.

mod discovery;
mod model;
mod plan;
mod validation;

pub use model::{
    AdvisoryConfig, CircuitSettings, ClassifierConfig, CliArgs, Config, Defaults, GatewayConfig,
    MatcherKind, PatternConfig, PhaseConfig, RetrySettings, ServiceConfig,
};
pub use plan::{Phase, ReadinessDescriptor, ServiceSpec};

/// Directory searched for during discovery.
pub const CONFIG_DIR: &str = ".rdeploy";
/// File name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";
