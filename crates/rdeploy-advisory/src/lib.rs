//! Advisory service client
//!
//! When no local pattern explains a deployment failure, the engine asks an
//! external text-completion service for a remedy. Everything here is
//! best-effort: callers degrade to "no guidance" on any error.

mod chat_completions;
mod http_client;
pub mod redaction;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

use std::sync::Arc;

use rdeploy_config::AdvisoryConfig;
use tracing::debug;

pub use chat_completions::ChatCompletionsBackend;
pub use rdeploy_utils::error::AdvisoryError;
pub use types::AdvisoryBackend;

/// Build the configured advisory backend.
///
/// Returns `Ok(None)` when `[advisory].enabled = false`.
///
/// # Errors
///
/// Returns `AdvisoryError::Misconfiguration` when the API key variable is not
/// set or the HTTP client cannot be built.
pub fn backend_from_config(
    config: &AdvisoryConfig,
) -> Result<Option<Arc<dyn AdvisoryBackend>>, AdvisoryError> {
    if !config.enabled {
        debug!("Advisory escalation disabled by configuration");
        return Ok(None);
    }
    let backend = ChatCompletionsBackend::new_from_config(config)?;
    Ok(Some(Arc::new(backend)))
}
