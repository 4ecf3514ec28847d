//! Exit code constants and error mapping for rdeploy.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Every phase succeeded, or accepted partial success |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `DEPLOY_ABORTED` | A required service failed and the deployment stopped |
//! | 4 | `GATEWAY_UNAVAILABLE` | The container runtime could not be driven |
//! | 130 | `INTERRUPTED` | Interrupted by signal |

use crate::error::DeployError;

/// Exit codes matching the documented exit code table.
///
/// The numeric values are part of the public API; scripts wrapping rdeploy
/// branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - deployment completed (fully or with accepted partial failures)
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - unexpected failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments or configuration error
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A required service failed; later phases were not attempted
    pub const DEPLOY_ABORTED: ExitCode = ExitCode(3);

    /// The workload runtime could not be reached
    pub const GATEWAY_UNAVAILABLE: ExitCode = ExitCode(4);

    /// Interrupted by SIGINT / Ctrl-C (128 + 2)
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an `ExitCode` from a raw value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        Self(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl DeployError {
    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Aborted { .. } => ExitCode::DEPLOY_ABORTED,
            Self::Gateway(crate::error::GatewayError::Unavailable { .. }) => {
                ExitCode::GATEWAY_UNAVAILABLE
            }
            Self::Interrupted => ExitCode::INTERRUPTED,
            _ => ExitCode::INTERNAL,
        }
    }
}
