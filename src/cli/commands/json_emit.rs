//! JSON emit functions for CLI output
//!
//! Every machine-readable output is canonical JSON (JCS, RFC 8785) so that
//! repeated runs diff cleanly.

use anyhow::{Context, Result};

use rdeploy_engine::{ErrorReport, ServiceStatusReport, StopReport};

use crate::emit_jcs;

/// Emit a status snapshot as canonical JSON.
pub fn emit_status_json(statuses: &[ServiceStatusReport]) -> Result<String> {
    emit_jcs(&statuses).context("Failed to emit status JSON")
}

/// Emit a stop sweep result as canonical JSON.
pub fn emit_stop_json(report: &StopReport) -> Result<String> {
    emit_jcs(report).context("Failed to emit stop JSON")
}

/// Emit a classification as canonical JSON.
pub fn emit_classification_json(report: &ErrorReport) -> Result<String> {
    emit_jcs(report).context("Failed to emit classification JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdeploy_engine::ClassificationSource;

    #[test]
    fn test_classification_json_is_canonical() {
        let json = emit_classification_json(&ErrorReport {
            message: "no space left on device".to_string(),
            remedy: "Free disk space".to_string(),
            source: ClassificationSource::PatternMatched,
            service: None,
            fatal: false,
        })
        .unwrap();
        assert!(json.starts_with(r#"{"fatal":false,"message":"no space left on device""#));
        assert!(json.contains(r#""source":"pattern-matched""#));
    }

    #[test]
    fn test_stop_json_lists_failures_as_pairs() {
        let json = emit_stop_json(&StopReport {
            stopped: vec!["api".to_string()],
            failed: vec![("mysql".to_string(), "stop timed out after 300s".to_string())],
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"failed":[["mysql","stop timed out after 300s"]],"stopped":["api"]}"#
        );
    }
}
