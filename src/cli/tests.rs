//! Argument parsing and command wiring tests

use clap::Parser;
use std::path::PathBuf;

use super::args::{Cli, Commands, build_cli};

#[test]
fn test_cli_definition_is_consistent() {
    build_cli().debug_assert();
}

#[test]
fn test_deploy_defaults() {
    let cli = Cli::try_parse_from(["rdeploy", "deploy"]).unwrap();
    match cli.command {
        Commands::Deploy {
            report,
            json,
            reruns,
            rerun_interval,
        } => {
            assert!(report.is_none());
            assert!(!json);
            assert_eq!(reruns, 0);
            assert_eq!(rerun_interval, 30);
        }
        other => panic!("expected deploy, got {other:?}"),
    }
}

#[test]
fn test_global_overrides_reach_cli_args() {
    let cli = Cli::try_parse_from([
        "rdeploy",
        "deploy",
        "--config",
        "stack/rdeploy.toml",
        "--max-attempts",
        "7",
        "--circuit-threshold",
        "2",
        "--runtime",
        "podman",
        "--no-advisory",
    ])
    .unwrap();

    let args = cli.cli_args();
    assert_eq!(args.config_path, Some(PathBuf::from("stack/rdeploy.toml")));
    assert_eq!(args.max_attempts, Some(7));
    assert_eq!(args.circuit_threshold, Some(2));
    assert_eq!(args.gateway_binary.as_deref(), Some("podman"));
    assert!(args.no_advisory);
    assert_eq!(args.poll_interval, None);
}

#[test]
fn test_deploy_report_and_reruns() {
    let cli = Cli::try_parse_from([
        "rdeploy",
        "deploy",
        "--report",
        "out/report.json",
        "--reruns",
        "3",
        "--rerun-interval",
        "10",
    ])
    .unwrap();
    assert_eq!(cli.command.operation(), "deploy");
    let Commands::Deploy {
        report,
        reruns,
        rerun_interval,
        ..
    } = cli.command
    else {
        panic!("expected deploy");
    };
    assert_eq!(report, Some(PathBuf::from("out/report.json")));
    assert_eq!(reruns, 3);
    assert_eq!(rerun_interval, 10);
}

#[test]
fn test_classify_takes_message_and_service() {
    let cli = Cli::try_parse_from([
        "rdeploy",
        "classify",
        "pull access denied for myorg/api",
        "--service",
        "api",
        "--json",
    ])
    .unwrap();
    let Commands::Classify {
        message,
        service,
        json,
    } = cli.command
    else {
        panic!("expected classify");
    };
    assert_eq!(message, "pull access denied for myorg/api");
    assert_eq!(service.as_deref(), Some("api"));
    assert!(json);
}

#[test]
fn test_classify_requires_message() {
    assert!(Cli::try_parse_from(["rdeploy", "classify"]).is_err());
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["rdeploy", "rollback"]).is_err());
}
