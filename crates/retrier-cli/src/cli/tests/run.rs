//! Tests for the run subcommand.

use super::parse;
use crate::cli::grammar::{AlgorithmSpec, JitterSpec, JitteredBackoff, WaitList};
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::time::Duration;

#[test]
fn cli_parse_run_minimal() {
    match parse(&["retry", "run", "--", "curl", "-f", "http://localhost"]) {
        CliCommand::Run(args) => {
            assert_eq!(args.command, vec!["curl", "-f", "http://localhost"]);
            assert!(args.timeout.is_none());
            assert!(args.limit.is_empty());
            assert!(!args.infinite);
            assert!(!args.no_report);
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_all_flags() {
    match parse(&[
        "retry",
        "run",
        "--timeout",
        "30s",
        "--limit=3",
        "--delay",
        "100ms",
        "--wait",
        "1s,2s",
        "--backoff",
        "exp[10ms,2]",
        "--tbackoff",
        "lin[1s] dev[0.5]",
        "--infinite",
        "--no-report",
        "--",
        "make",
        "test",
    ]) {
        CliCommand::Run(args) => {
            assert_eq!(args.timeout, Some(Duration::from_secs(30)));
            assert_eq!(args.limit, vec![3]);
            assert_eq!(args.delay, vec![Duration::from_millis(100)]);
            assert_eq!(
                args.wait,
                vec![WaitList(vec![Duration::from_secs(1), Duration::from_secs(2)])]
            );
            assert_eq!(
                args.backoff,
                vec![AlgorithmSpec::Exponential {
                    factor: Duration::from_millis(10),
                    base: 2.0
                }]
            );
            assert_eq!(
                args.tbackoff,
                vec![JitteredBackoff {
                    algorithm: AlgorithmSpec::Linear(Duration::from_secs(1)),
                    jitter: JitterSpec::Deviation(0.5),
                }]
            );
            assert!(args.infinite);
            assert!(args.no_report);
            assert_eq!(args.command, vec!["make", "test"]);
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_requires_command() {
    assert!(Cli::try_parse_from(["retry", "run", "--limit", "3"]).is_err());
}

#[test]
fn cli_parse_run_rejects_bad_grammar() {
    let err = Cli::try_parse_from(["retry", "run", "--backoff", "square[1s]", "--", "true"])
        .unwrap_err();
    assert!(err.to_string().contains("unknown algorithm"));
    assert!(Cli::try_parse_from(["retry", "run", "--timeout", "soon", "--", "true"]).is_err());
}

#[test]
fn cli_parse_global_config_flag() {
    let cli = Cli::try_parse_from(["retry", "run", "--config", "/tmp/r.toml", "--", "true"]).unwrap();
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/r.toml")));
}
