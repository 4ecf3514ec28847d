pub mod clock;
pub mod error;
pub mod exit_codes;
pub mod logging;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use clock::{Clock, SystemClock};
pub use error::{
    AdvisoryError, ConfigError, DeployError, ErrorCategory, GatewayError, StartError,
    UserFriendlyError,
};
pub use exit_codes::ExitCode;
