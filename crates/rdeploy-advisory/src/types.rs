use async_trait::async_trait;

use rdeploy_utils::error::AdvisoryError;

/// A text-completion service that can suggest a remedy for a failure.
#[async_trait]
pub trait AdvisoryBackend: Send + Sync {
    /// Short provider label for logs.
    fn name(&self) -> &str;

    /// Send `prompt` and return the completion text.
    ///
    /// Implementations should bound their own network time; callers add an
    /// outer timeout regardless.
    async fn complete(&self, prompt: &str) -> Result<String, AdvisoryError>;
}
