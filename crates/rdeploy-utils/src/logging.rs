//! Logging and observability infrastructure for rdeploy
//!
//! Structured logging via `tracing`. The subscriber is installed once by the
//! binary; library crates only emit events and spans.

use tracing::{Level, info, span, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, one line per event
    #[default]
    Compact,
    /// One JSON object per event, for log shippers
    Json,
}

/// Build the env filter used by [`init_tracing`].
///
/// `RUST_LOG` always wins; otherwise verbose mode enables debug output for
/// rdeploy crates.
fn build_env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("rdeploy=debug,info")
            } else {
                EnvFilter::try_new("rdeploy=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the tracing subscriber for structured logging.
///
/// Logs go to stderr so that `--json` output on stdout stays machine readable.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool, format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = build_env_filter(verbose);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(true)
                        .with_target(true),
                )
                .try_init()?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(verbose)
                        .with_thread_ids(false)
                        .with_thread_names(false)
                        .with_line_number(false)
                        .with_file(false)
                        .compact(),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Create a span for one deployment phase.
pub fn phase_span(index: usize, name: &str) -> tracing::Span {
    span!(Level::INFO, "phase", index = index, name = %name)
}

/// Log phase completion with its outcome and duration.
pub fn log_phase_complete(index: usize, name: &str, outcome: &str, duration_ms: u128) {
    info!(
        phase = index,
        name = %name,
        outcome = %outcome,
        duration_ms = %duration_ms,
        "Phase finished"
    );
}

/// Log a deployment abort.
pub fn log_abort(index: usize, service: &str, remedy: &str) {
    warn!(
        phase = index,
        service = %service,
        remedy = %remedy,
        "Deployment aborted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_span_is_constructible_without_subscriber() {
        let span = phase_span(1, "infrastructure");
        let _guard = span.enter();
        log_phase_complete(1, "infrastructure", "success", 12);
        log_abort(1, "mysql", "no guidance available");
    }

    #[test]
    fn test_default_log_format_is_compact() {
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }
}
