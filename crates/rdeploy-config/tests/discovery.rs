//! Discovery and loading tests driven through real directories.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rdeploy_config::{CliArgs, Config, MatcherKind, ReadinessDescriptor};
use rdeploy_utils::error::ConfigError;
use tempfile::TempDir;

const PLATFORM_CONFIG: &str = r#"
[defaults]
poll_interval = 2
startup_timeout = 60

[retry]
max_attempts = 4
initial_delay = 0.5

[circuit]
threshold = 3
cooldown = 30

[gateway]
compose_file = "docker-compose.yml"
project = "platform"

[advisory]
enabled = false

[[classifier.patterns]]
kind = "keywords"
keywords = ["mysql", "access denied"]
remedy = "Check MYSQL_ROOT_PASSWORD in .env"

[[phases]]
name = "infrastructure"
max_wait = 180
  [[phases.services]]
  id = "mysql"
  startup_timeout = 90
  readiness = { kind = "exec", command = ["mysqladmin", "ping", "-h", "localhost"] }

  [[phases.services]]
  id = "redis"
  readiness = { kind = "exec", command = ["redis-cli", "ping"], expect_output = "PONG" }

[[phases]]
name = "applications"
  [[phases.services]]
  id = "api"
  readiness = { kind = "http", url = "http://localhost:8000/health" }

  [[phases.services]]
  id = "worker"
  required = false
  readiness = { kind = "container-health" }
"#;

fn write_config(root: &Path, content: &str) {
    let dir = root.join(".rdeploy");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), content).unwrap();
}

#[test]
fn test_discovers_config_from_nested_directory() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), PLATFORM_CONFIG);
    let nested = temp.path().join("services").join("api");
    fs::create_dir_all(&nested).unwrap();

    let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();

    assert_eq!(config.defaults.poll_interval, 2);
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.multiplier, 2.0);
    assert_eq!(config.circuit.threshold, 3);
    assert_eq!(config.gateway.project.as_deref(), Some("platform"));
    assert_eq!(config.gateway.working_dir.as_deref(), Some(temp.path()));
    assert_eq!(
        config.source_path.as_deref(),
        Some(temp.path().join(".rdeploy").join("config.toml").as_path())
    );
    assert_eq!(config.classifier.patterns[0].kind, MatcherKind::Keywords);
}

#[test]
fn test_plan_from_file_preserves_order_and_readiness() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), PLATFORM_CONFIG);

    let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
    let plan = config.plan().unwrap();

    assert_eq!(plan.len(), 2);
    let ids: Vec<&str> = plan
        .iter()
        .flat_map(|p| p.services.iter().map(|s| s.id.as_str()))
        .collect();
    assert_eq!(ids, vec!["mysql", "redis", "api", "worker"]);

    assert_eq!(plan[0].services[0].startup_timeout, Duration::from_secs(90));
    assert_eq!(plan[0].services[1].startup_timeout, Duration::from_secs(60));
    assert_eq!(
        plan[0].services[1].readiness,
        Some(ReadinessDescriptor::Exec {
            command: vec!["redis-cli".to_string(), "ping".to_string()],
            expect_output: Some("PONG".to_string()),
        })
    );
    assert_eq!(
        plan[1].services[0].readiness,
        Some(ReadinessDescriptor::Http {
            url: "http://localhost:8000/health".to_string(),
            expected_status: 200,
        })
    );
    assert!(!plan[1].services[1].required);
    assert_eq!(
        plan[1].services[1].readiness,
        Some(ReadinessDescriptor::ContainerHealth)
    );
}

#[test]
fn test_discovery_stops_at_repository_root() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), PLATFORM_CONFIG);
    let repo = temp.path().join("repo");
    fs::create_dir_all(repo.join(".git")).unwrap();

    assert_eq!(Config::discover_config_file_from(&repo), None);
}

#[test]
fn test_missing_config_yields_defaults_and_empty_plan_error() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join(".git")).unwrap();

    let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
    assert!(config.source_path.is_none());
    assert_eq!(config.retry.max_attempts, 3);

    match config.plan() {
        Err(err @ ConfigError::MissingRequired(_)) => {
            assert!(err.to_string().contains("phases"));
        }
        other => panic!("Expected MissingRequired error, got {other:?}"),
    }
}

#[test]
fn test_explicit_missing_config_is_not_found() {
    let temp = TempDir::new().unwrap();
    let cli = CliArgs {
        config_path: Some(temp.path().join("nope.toml")),
        ..CliArgs::default()
    };

    let err = Config::discover_from(temp.path(), &cli).unwrap_err();
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::NotFound { path }) => assert!(path.ends_with("nope.toml")),
        other => panic!("Expected NotFound error, got {other:?}"),
    }
}

#[test]
fn test_malformed_file_is_invalid_file() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[retry\nmax_attempts = ");

    let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
    assert!(
        err.chain()
            .any(|cause| matches!(
                cause.downcast_ref::<ConfigError>(),
                Some(ConfigError::InvalidFile(_))
            ))
    );
}

#[test]
fn test_cli_override_is_validated() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), PLATFORM_CONFIG);
    let cli = CliArgs {
        max_attempts: Some(0),
        ..CliArgs::default()
    };

    let err = Config::discover_from(temp.path(), &cli).unwrap_err();
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "retry.max_attempts"),
        other => panic!("Expected InvalidValue error, got {other:?}"),
    }
}
