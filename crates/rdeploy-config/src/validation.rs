use regex::Regex;
use std::collections::HashSet;

use rdeploy_utils::error::ConfigError;

use crate::model::{Config, MatcherKind};
use crate::plan::ReadinessDescriptor;

fn invalid(key: impl Into<String>, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values.
    ///
    /// An empty plan is *not* rejected here (`classify` and `status` work
    /// without phases); [`Config::plan`] rejects it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.poll_interval < 1 {
            return Err(invalid("defaults.poll_interval", "must be at least 1 second"));
        }
        if self.defaults.start_timeout == 0 {
            return Err(invalid("defaults.start_timeout", "must be greater than 0"));
        }
        if self.defaults.probe_timeout == 0 {
            return Err(invalid("defaults.probe_timeout", "must be greater than 0"));
        }

        let retry = &self.retry;
        if retry.max_attempts < 1 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if !(retry.multiplier >= 1.0) {
            return Err(invalid(
                "retry.multiplier",
                format!("{} is below 1.0", retry.multiplier),
            ));
        }
        if !(retry.initial_delay > 0.0) {
            return Err(invalid("retry.initial_delay", "must be greater than 0"));
        }
        if !(retry.max_delay >= retry.initial_delay) {
            return Err(invalid(
                "retry.max_delay",
                format!(
                    "{} is smaller than retry.initial_delay ({})",
                    retry.max_delay, retry.initial_delay
                ),
            ));
        }

        if self.circuit.threshold < 1 {
            return Err(invalid("circuit.threshold", "must be at least 1"));
        }

        if self.gateway.binary.trim().is_empty() {
            return Err(invalid("gateway.binary", "must not be empty"));
        }

        if self.advisory.enabled {
            if !(self.advisory.endpoint.starts_with("http://")
                || self.advisory.endpoint.starts_with("https://"))
            {
                return Err(invalid(
                    "advisory.endpoint",
                    format!("'{}' is not an http(s) URL", self.advisory.endpoint),
                ));
            }
            if self.advisory.timeout == 0 {
                return Err(invalid("advisory.timeout", "must be greater than 0"));
            }
        }

        for (i, pattern) in self.classifier.patterns.iter().enumerate() {
            let key = format!("classifier.patterns[{i}]");
            match pattern.kind {
                MatcherKind::Substring if pattern.pattern.trim().is_empty() => {
                    return Err(invalid(key, "substring pattern must not be empty"));
                }
                MatcherKind::Keywords
                    if pattern.keywords.iter().all(|k| k.trim().is_empty()) =>
                {
                    return Err(invalid(key, "keywords pattern needs at least one keyword"));
                }
                MatcherKind::Regex => {
                    if let Err(e) = Regex::new(&pattern.pattern) {
                        return Err(invalid(key, format!("regex does not compile: {e}")));
                    }
                }
                _ => {}
            }
        }

        let mut ids = HashSet::new();
        for phase in &self.phases {
            if phase.name.trim().is_empty() {
                return Err(invalid("phases.name", "must not be empty"));
            }
            if phase.max_wait == Some(0) {
                return Err(invalid(
                    format!("phases[{}].max_wait", phase.name),
                    "must be greater than 0",
                ));
            }
            for service in &phase.services {
                if service.id.trim().is_empty() {
                    return Err(invalid(
                        format!("phases[{}].services.id", phase.name),
                        "must not be empty",
                    ));
                }
                if !ids.insert(service.id.as_str()) {
                    return Err(invalid(
                        "phases.services.id",
                        format!("'{}' is declared more than once", service.id),
                    ));
                }
                if let Some(readiness) = &service.readiness {
                    validate_readiness(&service.id, readiness)?;
                }
            }
        }

        Ok(())
    }
}

fn validate_readiness(service: &str, readiness: &ReadinessDescriptor) -> Result<(), ConfigError> {
    let key = format!("{service}.readiness");
    match readiness {
        ReadinessDescriptor::Http {
            url,
            expected_status,
        } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(key, format!("'{url}' is not an http(s) URL")));
            }
            if !(100..=599).contains(expected_status) {
                return Err(invalid(
                    key,
                    format!("expected_status {expected_status} is not an HTTP status"),
                ));
            }
        }
        ReadinessDescriptor::Tcp { host, port } => {
            if host.trim().is_empty() {
                return Err(invalid(key, "tcp host must not be empty"));
            }
            if *port == 0 {
                return Err(invalid(key, "tcp port must not be 0"));
            }
        }
        ReadinessDescriptor::Exec { command, .. } => {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(invalid(key, "exec command must not be empty"));
            }
        }
        ReadinessDescriptor::ContainerHealth => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_invalid(toml: &str, expected_key: &str) {
        let config = Config::from_toml_str(toml).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert!(key.contains(expected_key), "key {key} lacks {expected_key}");
            }
            other => panic!("Expected InvalidValue for {expected_key}, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_retry_bounds() {
        expect_invalid("[retry]\nmax_attempts = 0", "retry.max_attempts");
        expect_invalid("[retry]\nmultiplier = 0.5", "retry.multiplier");
        expect_invalid("[retry]\ninitial_delay = 0.0", "retry.initial_delay");
        expect_invalid("[retry]\ninitial_delay = 5.0\nmax_delay = 2.0", "retry.max_delay");
    }

    #[test]
    fn test_circuit_and_poll_bounds() {
        expect_invalid("[circuit]\nthreshold = 0", "circuit.threshold");
        expect_invalid("[defaults]\npoll_interval = 0", "defaults.poll_interval");
    }

    #[test]
    fn test_bad_classifier_regex_is_rejected() {
        expect_invalid(
            r#"
            [[classifier.patterns]]
            kind = "regex"
            pattern = "port (\\d+"
            remedy = "free the port"
            "#,
            "classifier.patterns[0]",
        );
    }

    #[test]
    fn test_readiness_shapes_are_checked() {
        expect_invalid(
            r#"
            [[phases]]
            name = "infra"
              [[phases.services]]
              id = "broker"
              readiness = { kind = "tcp", host = "localhost", port = 0 }
            "#,
            "broker.readiness",
        );
        expect_invalid(
            r#"
            [[phases]]
            name = "infra"
              [[phases.services]]
              id = "cache"
              readiness = { kind = "exec", command = [] }
            "#,
            "cache.readiness",
        );
        expect_invalid(
            r#"
            [[phases]]
            name = "apps"
              [[phases.services]]
              id = "api"
              readiness = { kind = "http", url = "localhost:8000/health" }
            "#,
            "api.readiness",
        );
    }

    #[test]
    fn test_disabled_advisory_skips_endpoint_check() {
        let config =
            Config::from_toml_str("[advisory]\nenabled = false\nendpoint = \"nope\"").unwrap();
        assert!(config.validate().is_ok());
    }
}
