//! Process execution for the workload runtime
//!
//! Every command the orchestrator issues (compose up/stop/ps/exec/logs) goes
//! through this crate with a hard upper time bound.
//!
//! # Security Model
//!
//! All process execution goes through [`CommandSpec`] to ensure argv-style invocation.
//! Service identifiers and probe commands come from configuration and are passed as
//! discrete elements, never interpolated into a shell string.

pub mod command_spec;
pub mod error;
pub mod native;
pub mod process;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use native::NativeRunner;
pub use process::{ProcessOutput, ProcessRunner};
