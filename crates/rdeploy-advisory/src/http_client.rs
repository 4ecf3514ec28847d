//! Shared HTTP client for the advisory service.

use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use rdeploy_utils::error::AdvisoryError;

use crate::redaction::redact;

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries after the first attempt, for 5xx and network failures only
const MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Connection-pooling client with a per-request timeout and a small retry policy.
#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    initial_backoff: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `AdvisoryError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, AdvisoryError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                AdvisoryError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client: Arc::new(client),
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Execute a request, retrying 5xx and network failures with linear backoff.
    ///
    /// 4xx responses are never retried:
    /// - 401/403 → `AdvisoryError::ProviderAuth`
    /// - 429 → `AdvisoryError::ProviderQuota`
    /// - other 4xx → `AdvisoryError::Transport`
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        timeout: Duration,
        provider: &str,
    ) -> Result<Response, AdvisoryError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| {
                    AdvisoryError::Transport("Failed to clone request for retry".to_string())
                })?
                .timeout(timeout)
                .build()
                .map_err(|e| AdvisoryError::Transport(format!("Failed to build request: {e}")))?;

            debug!(provider, attempt, timeout_secs = timeout.as_secs(), "Sending advisory request");

            let error = match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_client_error() {
                        return Err(map_client_error(status, provider));
                    }
                    if !status.is_server_error() {
                        return Ok(response);
                    }
                    AdvisoryError::ProviderOutage(format!(
                        "{provider} returned server error: {status}"
                    ))
                }
                Err(e) if e.is_timeout() => {
                    return Err(AdvisoryError::Timeout { duration: timeout });
                }
                Err(e) => AdvisoryError::Transport(format!(
                    "{provider} request failed: {}",
                    redact(&e.to_string())
                )),
            };

            if attempt > MAX_RETRIES {
                return Err(error);
            }
            warn!(provider, attempt, error = %error, "Advisory request failed, will retry");
            tokio::time::sleep(self.initial_backoff * attempt).await;
        }
    }
}

fn map_client_error(status: StatusCode, provider: &str) -> AdvisoryError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdvisoryError::ProviderAuth(format!("{provider} authentication failed: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            AdvisoryError::ProviderQuota(format!("{provider} rate limit exceeded: {status}"))
        }
        _ => AdvisoryError::Transport(format!("{provider} returned client error: {status}")),
    }
}
