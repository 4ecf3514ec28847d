//! Failure classification.
//!
//! A raw failure message is matched case-insensitively against an ordered
//! list of `(Matcher, remedy)` rules; the first match wins. Without a match
//! the message and its context are escalated to the advisory service under
//! a bounded timeout. Escalation is best effort: any failure there yields a
//! report with no remedy, never an error.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use rdeploy_advisory::AdvisoryBackend;
use rdeploy_advisory::redaction::redact;
use rdeploy_config::{ClassifierConfig, MatcherKind, PatternConfig};
use rdeploy_utils::error::ConfigError;

use crate::retry::{AttemptOutcome, RetryAttempt};

/// Text shown when a report carries no remedy.
pub const NO_GUIDANCE: &str = "no guidance available";

/// A predicate over a lowercased failure message.
pub trait Matcher: Send + Sync + fmt::Debug {
    fn matches(&self, lowered: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    needle: String,
}

impl SubstringMatcher {
    #[must_use]
    pub fn new(needle: &str) -> Self {
        Self {
            needle: needle.to_lowercase(),
        }
    }
}

impl Matcher for SubstringMatcher {
    fn matches(&self, lowered: &str) -> bool {
        lowered.contains(&self.needle)
    }
}

/// Matches when every keyword occurs somewhere in the message.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    #[must_use]
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Matcher for KeywordMatcher {
    fn matches(&self, lowered: &str) -> bool {
        !self.keywords.is_empty() && self.keywords.iter().all(|k| lowered.contains(k.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    /// Compile `pattern` case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: RegexBuilder::new(pattern).case_insensitive(true).build()?,
        })
    }
}

impl Matcher for RegexMatcher {
    fn matches(&self, lowered: &str) -> bool {
        self.regex.is_match(lowered)
    }
}

/// One row of the remedy table.
#[derive(Debug)]
pub struct PatternRule {
    matcher: Box<dyn Matcher>,
    remedy: String,
}

impl PatternRule {
    #[must_use]
    pub fn new(matcher: Box<dyn Matcher>, remedy: impl Into<String>) -> Self {
        Self {
            matcher,
            remedy: remedy.into(),
        }
    }

    #[must_use]
    pub fn substring(needle: &str, remedy: &str) -> Self {
        Self::new(Box::new(SubstringMatcher::new(needle)), remedy)
    }

    #[must_use]
    pub fn keywords(keywords: &[&str], remedy: &str) -> Self {
        Self::new(Box::new(KeywordMatcher::new(keywords)), remedy)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a regex pattern does not compile.
    pub fn from_config(config: &PatternConfig) -> Result<Self, ConfigError> {
        let matcher: Box<dyn Matcher> = match config.kind {
            MatcherKind::Substring => Box::new(SubstringMatcher::new(&config.pattern)),
            MatcherKind::Keywords => Box::new(KeywordMatcher::new(&config.keywords)),
            MatcherKind::Regex => Box::new(RegexMatcher::new(&config.pattern).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "classifier.patterns".to_string(),
                    value: format!("{}: {e}", config.pattern),
                }
            })?),
        };
        Ok(Self::new(matcher, config.remedy.clone()))
    }

    #[must_use]
    pub fn remedy(&self) -> &str {
        &self.remedy
    }
}

/// Remedies for failures the container runtime commonly reports.
#[must_use]
pub fn builtin_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::substring(
            "port is already allocated",
            "Another process holds a published port. Stop it (find it with `lsof -i :<port>`) or change the port mapping in the compose file.",
        ),
        PatternRule::substring(
            "address already in use",
            "Another process holds a published port. Stop it (find it with `lsof -i :<port>`) or change the port mapping in the compose file.",
        ),
        PatternRule::substring(
            "is the docker daemon running",
            "The Docker daemon is not reachable. Start it (`systemctl start docker`) and make sure your user can access /var/run/docker.sock.",
        ),
        PatternRule::keywords(
            &["cannot connect", "docker daemon"],
            "The Docker daemon is not reachable. Start it (`systemctl start docker`) and make sure your user can access /var/run/docker.sock.",
        ),
        PatternRule::substring(
            "pull access denied",
            "The image could not be pulled. Check the image name, and run `docker login` for private registries.",
        ),
        PatternRule::substring(
            "manifest unknown",
            "The image tag does not exist in the registry. Check the tag in the compose file.",
        ),
        PatternRule::substring(
            "no space left on device",
            "The disk is full. Free space with `docker system prune` and check the filesystem backing your volumes.",
        ),
        PatternRule::substring(
            "oomkilled",
            "The container was killed for exceeding its memory. Raise its memory limit or free memory on the host.",
        ),
        PatternRule::substring(
            "out of memory",
            "The container was killed for exceeding its memory. Raise its memory limit or free memory on the host.",
        ),
        PatternRule::substring(
            "permission denied",
            "Permission denied. Check ownership and mode of mounted volumes and that the container user may access them.",
        ),
        PatternRule::substring(
            "connection refused",
            "A dependency refused the connection. Make sure it is started and listening, and that host and port are right.",
        ),
        PatternRule::keywords(
            &["network", "not found"],
            "A referenced network is missing. Create it with `docker network create <name>` or declare it in the compose file.",
        ),
        PatternRule::keywords(
            &["volume", "not found"],
            "A referenced volume is missing. Create it with `docker volume create <name>` or declare it in the compose file.",
        ),
        PatternRule::substring(
            "timed out",
            "The operation timed out. Check host load, then raise `startup_timeout` or `start_timeout` if the service is slow to start.",
        ),
    ]
}

/// Where a report's remedy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationSource {
    PatternMatched,
    AiEscalated,
    None,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PatternMatched => write!(f, "pattern-matched"),
            Self::AiEscalated => write!(f, "ai-escalated"),
            Self::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub message: String,
    /// Empty when no remedy is known
    pub remedy: String,
    pub source: ClassificationSource,
    pub service: Option<String>,
    pub fatal: bool,
}

impl ErrorReport {
    /// The remedy, or [`NO_GUIDANCE`] when there is none.
    #[must_use]
    pub fn remedy_or_default(&self) -> &str {
        if self.remedy.is_empty() {
            NO_GUIDANCE
        } else {
            &self.remedy
        }
    }
}

/// What the classifier knows about the failure beyond its message.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    pub service: Option<String>,
    /// Index and name of the phase
    pub phase: Option<(usize, String)>,
    pub attempts: Vec<RetryAttempt>,
    pub recent_logs: Vec<String>,
}

impl FailureContext {
    #[must_use]
    pub fn for_service(service: &str) -> Self {
        Self {
            service: Some(service.to_string()),
            ..Self::default()
        }
    }
}

pub struct ErrorClassifier {
    rules: Vec<PatternRule>,
    advisory: Option<Arc<dyn AdvisoryBackend>>,
    advisory_timeout: Duration,
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("rules", &self.rules.len())
            .field("advisory", &self.advisory.as_ref().map(|a| a.name().to_string()))
            .field("advisory_timeout", &self.advisory_timeout)
            .finish()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(builtin_rules())
    }
}

impl ErrorClassifier {
    /// Classifier over `rules` with no advisory backend.
    #[must_use]
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self {
            rules,
            advisory: None,
            advisory_timeout: Duration::from_secs(30),
        }
    }

    /// Configured patterns first, then the built-in table.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a configured regex does not compile.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let mut rules = config
            .patterns
            .iter()
            .map(PatternRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(builtin_rules());
        Ok(Self::new(rules))
    }

    #[must_use]
    pub fn with_advisory(mut self, backend: Arc<dyn AdvisoryBackend>, timeout: Duration) -> Self {
        self.advisory = Some(backend);
        self.advisory_timeout = timeout;
        self
    }

    #[must_use]
    pub fn has_advisory(&self) -> bool {
        self.advisory.is_some()
    }

    /// First matching remedy from the table.
    #[must_use]
    pub fn match_remedy(&self, message: &str) -> Option<&str> {
        let lowered = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(&lowered))
            .map(PatternRule::remedy)
    }

    /// Classify `message`. Never fails; the returned report is not fatal.
    pub async fn classify(&self, message: &str, context: &FailureContext) -> ErrorReport {
        let mut report = ErrorReport {
            message: message.to_string(),
            remedy: String::new(),
            source: ClassificationSource::None,
            service: context.service.clone(),
            fatal: false,
        };

        if let Some(remedy) = self.match_remedy(message) {
            debug!(service = ?context.service, "Failure matched a known pattern");
            report.remedy = remedy.to_string();
            report.source = ClassificationSource::PatternMatched;
            return report;
        }

        let Some(backend) = &self.advisory else {
            debug!(service = ?context.service, "No pattern matched and advisory is disabled");
            return report;
        };

        info!(
            service = ?context.service,
            provider = backend.name(),
            "No pattern matched, asking advisory service"
        );
        let prompt = build_prompt(message, context);
        match tokio::time::timeout(self.advisory_timeout, backend.complete(&prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                report.remedy = text.trim().to_string();
                report.source = ClassificationSource::AiEscalated;
            }
            Ok(Ok(_)) => warn!(provider = backend.name(), "Advisory service returned no text"),
            Ok(Err(e)) => warn!(
                provider = backend.name(),
                error = %redact(&e.to_string()),
                "Advisory service failed, continuing without guidance"
            ),
            Err(_) => warn!(
                provider = backend.name(),
                timeout_secs = self.advisory_timeout.as_secs(),
                "Advisory service timed out, continuing without guidance"
            ),
        }
        report
    }
}

/// Prompt for the advisory service. Everything in it is redacted.
#[must_use]
pub fn build_prompt(message: &str, context: &FailureContext) -> String {
    let mut prompt = String::from("A service deployment failed.\n");
    if let Some(service) = &context.service {
        let _ = writeln!(prompt, "Service: {service}");
    }
    if let Some((index, name)) = &context.phase {
        let _ = writeln!(prompt, "Phase: {index} ({name})");
    }
    let _ = writeln!(prompt, "Error: {}", message.trim());

    let failures: Vec<&str> = context
        .attempts
        .iter()
        .filter_map(|attempt| match &attempt.outcome {
            AttemptOutcome::Failed { error } => Some(error.as_str()),
            AttemptOutcome::Succeeded => None,
        })
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(prompt, "\nStart attempts ({}):", context.attempts.len());
        for (i, error) in failures.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, error.trim());
        }
    }

    if !context.recent_logs.is_empty() {
        let _ = writeln!(prompt, "\nRecent service logs:");
        for line in &context.recent_logs {
            let _ = writeln!(prompt, "{line}");
        }
    }

    prompt.push_str("\nWhat should the operator do to fix this?");
    redact(&prompt)
}
