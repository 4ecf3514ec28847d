//! Classify command implementation
//!
//! Handles `rdeploy classify <message>`: run a message through the same
//! classifier a deployment abort uses, without touching the runtime.

use anyhow::Result;

use rdeploy_engine::{ClassificationSource, FailureContext};

use super::common::advisory_backend;
use super::json_emit::emit_classification_json;
use crate::{Config, DeployError, ErrorClassifier, ExitCode};

/// Execute the classify command.
pub async fn execute_classify_command(
    config: &Config,
    message: &str,
    service: Option<&str>,
    json: bool,
) -> Result<ExitCode> {
    let mut classifier =
        ErrorClassifier::from_config(&config.classifier).map_err(DeployError::from)?;
    if let Some(backend) = advisory_backend(config) {
        classifier = classifier.with_advisory(backend, config.advisory.timeout());
    }

    let context = match service {
        Some(service) => FailureContext::for_service(service),
        None => FailureContext::default(),
    };
    let report = classifier.classify(message, &context).await;

    if json {
        println!("{}", emit_classification_json(&report)?);
    } else {
        let origin = match report.source {
            ClassificationSource::PatternMatched => "known pattern",
            ClassificationSource::AiEscalated => "advisory service",
            ClassificationSource::None => "no match",
        };
        println!("remedy: {}", report.remedy_or_default());
        println!("source: {origin}");
    }
    Ok(ExitCode::SUCCESS)
}
